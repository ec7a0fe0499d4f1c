pub mod capability;
pub mod document;
pub mod grant;
pub mod organization;
pub mod project;
pub mod user;
