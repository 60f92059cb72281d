pub mod links;
pub mod redirect;
