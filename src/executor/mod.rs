mod runner;

pub use runner::{drive, forward_ctrl_c, run_file};
