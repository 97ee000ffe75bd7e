//! Verification metrics: ROC curve, EER/AUC, K-fold reduction, and the
//! held-out evaluation pass that feeds them.

pub mod folds;
pub mod pass;
pub mod roc;
