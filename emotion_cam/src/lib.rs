//! Desktop front-end showing detected emotions live on the camera image.
pub mod capture;
pub mod meter;
#[cfg(feature = "opencv")]
pub mod sensors;
