pub mod cursor;
pub mod decode;
pub mod row;
pub mod scan;
pub mod value;
