//! Application services layer.

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod index_sync;
pub mod jobs;
pub mod orders;
pub mod pagination;
pub mod password;
pub mod repos;
pub mod search;
pub mod wechat;
