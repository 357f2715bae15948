pub mod command;
pub mod formats;
pub mod track;
