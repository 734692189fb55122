pub mod io;
pub mod time;
