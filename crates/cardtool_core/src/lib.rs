pub mod audit;
pub mod catalog;
pub mod config;
pub mod extract;
pub mod filesystem;
pub mod markup;
pub mod resolve;
pub mod runtime;
pub mod score;
pub mod seed;
pub mod slug;
pub mod storage;
pub mod sync;
