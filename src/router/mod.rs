//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea método + path a handlers.
//!
//! ```text
//! Request → Router → Handler → Response
//! ```
//!
//! Los patrones admiten segmentos de captura `{nombre}`; por ejemplo
//! `/poll/{job_id}/{key}`. Los valores capturados se decodifican con
//! percent-decoding antes de llegar al handler. Un path sin ruta produce
//! 404; un path con ruta pero otro método produce 405.

use crate::http::{Method, Request, Response, StatusCode};
use std::collections::HashMap;

/// Parámetros capturados del path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Valor capturado para `{name}`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

/// Un handler recibe el request y los parámetros del path
pub type Handler = Box<dyn Fn(&Request, &Params) -> Response + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

struct Route {
    method: Method,
    segments: Vec<Segment>,
    handler: Handler,
}

impl Route {
    /// Compara el path contra el patrón y extrae las capturas
    fn matches(&self, path: &[&str]) -> Option<Params> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::default();
        for (segment, part) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Capture(name) => {
                    let value = urlencoding::decode(part).ok()?.into_owned();
                    params.values.insert(name.clone(), value);
                }
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .into_iter()
        .map(|part| match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => Segment::Capture(name.to_string()),
            None => Segment::Literal(part.to_string()),
        })
        .collect()
}

/// Router que mapea (método, patrón) a handlers
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Crea un nuevo router vacío
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una ruta con su handler
    ///
    /// # Ejemplo
    /// ```
    /// use job_server::http::{Method, Request, Response, StatusCode};
    /// use job_server::router::Router;
    /// use serde_json::json;
    ///
    /// let mut router = Router::new();
    /// router.register(Method::GET, "/hello/{name}", |_req, params| {
    ///     Response::json(StatusCode::Ok, &json!({ "hello": params.get("name") }))
    /// });
    ///
    /// let request = Request::parse(b"GET /hello/world HTTP/1.0\r\n\r\n").unwrap();
    /// assert_eq!(router.route(&request).status(), StatusCode::Ok);
    /// ```
    pub fn register<F>(&mut self, method: Method, pattern: &str, handler: F)
    where
        F: Fn(&Request, &Params) -> Response + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            segments: parse_pattern(pattern),
            handler: Box::new(handler),
        });
    }

    /// Cantidad de rutas registradas
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Encuentra y ejecuta el handler apropiado para un request
    pub fn route(&self, request: &Request) -> Response {
        let path = split_path(request.path());
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.matches(&path) else {
                continue;
            };
            if route.method != request.method() {
                path_matched = true;
                continue;
            }

            let mut response = (route.handler)(request, &params);
            self.add_common_headers(&mut response);
            return response;
        }

        let mut response = if path_matched {
            Response::error(
                StatusCode::MethodNotAllowed,
                &format!("Method {} not allowed", request.method().as_str()),
            )
        } else {
            Response::error(
                StatusCode::NotFound,
                &format!("Route not found: {}", request.path()),
            )
        };
        self.add_common_headers(&mut response);
        response
    }

    /// Agrega headers comunes a todas las respuestas
    fn add_common_headers(&self, response: &mut Response) {
        response.add_header("Server", "job_server/0.1");
        response.add_header("Connection", "close");
    }
}
