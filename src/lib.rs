use std::error::Error;

pub mod cards;
pub mod config;
pub mod content;
pub mod db;
pub mod dom;
pub mod error;
pub mod handler;
pub mod messages;
pub mod relay;
pub mod router;
pub mod storage;
pub mod store;
pub mod surface;
pub mod tabs;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
