pub mod health;
pub mod permissions;
pub mod resources;
pub mod versions;
