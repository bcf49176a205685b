//! HTTP surface

pub mod routes;
