pub mod debug;
pub mod run;
pub mod watch;
