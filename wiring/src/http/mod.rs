pub mod convert;
pub mod response;
