pub mod deck;
pub mod note;
pub mod review;
pub mod transfer;
