pub mod access_codes;
pub mod health;
pub mod sessions;
pub mod voice;
