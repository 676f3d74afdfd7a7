pub mod calibrate;
pub mod check;
pub mod info;
pub mod init;
pub mod profiles;
pub mod replay;
pub mod synth;
