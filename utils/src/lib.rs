pub mod audio;
#[cfg(feature = "native")]
pub mod device;
#[cfg(feature = "native")]
pub mod resample;
