pub mod rows;
pub mod users;
pub mod writes;
