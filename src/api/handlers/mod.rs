pub mod site;
pub mod status;
