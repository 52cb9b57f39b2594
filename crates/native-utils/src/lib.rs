pub mod device;
pub mod microphone;
pub mod wav;
