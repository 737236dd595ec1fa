pub mod advice;
pub mod alert;
pub mod calibrator;
pub mod classifier;
pub mod contour;
pub mod curvature;
pub mod features;
pub mod geometry;
pub mod landmark;
pub mod smoother;
