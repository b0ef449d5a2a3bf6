//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Implementación mínima de HTTP/1.0 sin librerías de alto nivel:
//!
//! - Parsing de requests (headers, query string, body form-urlencoded)
//! - Construcción de responses
//! - Códigos de estado
//!
//! HTTP/1.0 (RFC 1945) no requiere `Host`, no tiene chunked encoding y
//! cierra la conexión después de cada respuesta. Se aceptan requests
//! `HTTP/1.1` pero se responden como 1.0.

pub mod request; // Parsing de HTTP requests
pub mod response; // Construcción de HTTP responses
pub mod status; // Códigos de estado HTTP

// Permite usar `http::Request` en vez de `http::request::Request`
pub use request::{Method, Request};
pub use response::Response;
pub use status::StatusCode;
