pub mod analyze;
pub mod prepare;
pub mod run;
pub mod single;
