//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Servidor TCP que atiende cada conexión en su propio thread.
//!
//! ```text
//! bind() → before_start() → accept loop → [stop()] → join threads → after_stop()
//! ```
//!
//! El loop de accept termina con un `StopHandle`: marca la bandera y abre
//! una conexión propia para desbloquear el `accept()` pendiente.

use crate::http::request::{content_length, header_end};
use crate::http::{Request, Response, StatusCode};
use crate::router::Router;
use std::error::Error;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Tamaño de lectura por llamada a `read`
const READ_CHUNK: usize = 4096;

/// Tiempo máximo esperando bytes de un cliente
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Límite por defecto de un request completo
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Resultado de un hook de ciclo de vida
pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Listener de ciclo de vida del servidor
///
/// `before_start` corre antes de aceptar conexiones y `after_stop` después
/// de que terminaron todas las conexiones en curso.
pub trait Lifecycle: Send + Sync {
    fn before_start(&self) -> HookResult {
        Ok(())
    }

    fn after_stop(&self) -> HookResult {
        Ok(())
    }
}

/// Errores del servidor
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is not bound; call bind() first")]
    NotBound,

    #[error("lifecycle hook failed: {0}")]
    Hook(#[source] Box<dyn Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Handle clonable para detener el loop de accept desde otro thread
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopping: Arc<AtomicBool>,
    address: Arc<OnceLock<SocketAddr>>,
}

impl StopHandle {
    /// Pide al servidor que deje de aceptar conexiones
    ///
    /// Llamarlo varias veces es equivalente a llamarlo una vez.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("server stop requested");

        let Some(address) = self.address.get() else {
            return;
        };
        let mut wake = *address;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        if let Err(e) = TcpStream::connect_timeout(&wake, Duration::from_secs(1)) {
            debug!(error = %e, "wake-up connection failed");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Resultado de leer un request del socket
#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
    /// El cliente cerró sin mandar nada
    Closed,

    Request(Vec<u8>),

    /// El request supera el límite configurado
    TooLarge,
}

/// Servidor HTTP/1.0 concurrente
pub struct Server {
    router: Router,
    lifecycles: Vec<Arc<dyn Lifecycle>>,
    max_request_bytes: usize,
    listener: Option<TcpListener>,
    stop: StopHandle,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            lifecycles: Vec::new(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            listener: None,
            stop: StopHandle::default(),
        }
    }

    pub fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Router para registrar rutas antes de `run()`
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Registra un listener; `after_stop` corre en orden inverso
    pub fn add_lifecycle(&mut self, lifecycle: Arc<dyn Lifecycle>) {
        self.lifecycles.push(lifecycle);
    }

    /// Abre el socket y retorna la dirección real (útil con puerto 0)
    pub fn bind<A: ToSocketAddrs>(&mut self, address: A) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(address)?;
        let local = listener.local_addr()?;
        let _ = self.stop.address.set(local);
        self.listener = Some(listener);
        Ok(local)
    }

    /// Dirección del socket si ya se llamó `bind()`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stop.address.get().copied()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Atiende conexiones hasta que se llame `StopHandle::stop()`
    pub fn run(&mut self) -> Result<(), ServerError> {
        let listener = self.listener.take().ok_or(ServerError::NotBound)?;

        for (started, lifecycle) in self.lifecycles.iter().enumerate() {
            if let Err(e) = lifecycle.before_start() {
                error!(error = %e, "lifecycle start hook failed");
                Self::run_stop_hooks(&self.lifecycles[..started]);
                return Err(ServerError::Hook(e));
            }
        }

        let router = Arc::new(std::mem::take(&mut self.router));
        let max_request_bytes = self.max_request_bytes;
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        info!(address = ?self.local_addr(), "accepting connections");

        if !self.stop.is_stopping() {
            for stream in listener.incoming() {
                if self.stop.is_stopping() {
                    break;
                }

                match stream {
                    Ok(stream) => {
                        let router = Arc::clone(&router);
                        workers.retain(|worker| !worker.is_finished());
                        workers.push(thread::spawn(move || {
                            if let Err(e) =
                                Self::handle_connection_static(stream, router, max_request_bytes)
                            {
                                warn!(error = %e, "connection failed");
                            }
                        }));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }

        drop(listener);
        for worker in workers {
            if worker.join().is_err() {
                error!("connection thread panicked");
            }
        }
        info!("server stopped accepting connections");

        match Self::run_stop_hooks(&self.lifecycles) {
            Some(e) => Err(ServerError::Hook(e)),
            None => Ok(()),
        }
    }

    /// Corre `after_stop` en orden inverso; retorna el primer error
    fn run_stop_hooks(lifecycles: &[Arc<dyn Lifecycle>]) -> Option<Box<dyn Error + Send + Sync>> {
        let mut first_error = None;
        for lifecycle in lifecycles.iter().rev() {
            if let Err(e) = lifecycle.after_stop() {
                error!(error = %e, "lifecycle stop hook failed");
                first_error.get_or_insert(e);
            }
        }
        first_error
    }

    /// Lee un request completo: headers más `Content-Length` bytes de body
    fn read_request(stream: &mut impl Read, max_request_bytes: usize) -> io::Result<ReadOutcome> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let bytes_read = stream.read(&mut chunk)?;
            if bytes_read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..bytes_read]);
            if buffer.len() > max_request_bytes {
                return Ok(ReadOutcome::TooLarge);
            }

            if let Some(end) = header_end(&buffer) {
                // Un Content-Length absurdo puede desbordar la suma
                let expected = match content_length(&buffer[..end]) {
                    Some(length) => (end + 4).checked_add(length),
                    None => Some(end + 4),
                };
                let Some(expected) = expected.filter(|&n| n <= max_request_bytes) else {
                    return Ok(ReadOutcome::TooLarge);
                };
                if buffer.len() >= expected {
                    break;
                }
            }
        }

        if buffer.is_empty() {
            Ok(ReadOutcome::Closed)
        } else {
            Ok(ReadOutcome::Request(buffer))
        }
    }

    fn handle_connection_static(
        mut stream: TcpStream,
        router: Arc<Router>,
        max_request_bytes: usize,
    ) -> io::Result<()> {
        let start = Instant::now();
        let request_id = format!("{:016x}", rand::random::<u64>());
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let (mut response, method, path) = match Self::read_request(&mut stream, max_request_bytes)? {
            ReadOutcome::Closed => {
                debug!("connection closed without a request");
                return Ok(());
            }
            ReadOutcome::TooLarge => (
                Response::error(
                    StatusCode::PayloadTooLarge,
                    &format!("Request exceeds {} bytes", max_request_bytes),
                ),
                "-",
                String::from("-"),
            ),
            ReadOutcome::Request(buffer) => match Request::parse(&buffer) {
                Ok(request) => (
                    router.route(&request),
                    request.method().as_str(),
                    request.path().to_string(),
                ),
                Err(e) => {
                    debug!(error = %e, "could not parse request");
                    (
                        Response::error(StatusCode::BadRequest, &format!("Invalid: {}", e)),
                        "-",
                        String::from("-"),
                    )
                }
            },
        };

        response.add_header("X-Request-Id", &request_id);
        stream.write_all(&response.to_bytes())?;
        stream.flush()?;

        info!(
            request_id = %request_id,
            method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "request handled"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use std::sync::Mutex;

    fn ephemeral_listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").expect("bind")
    }

    fn hello_router() -> Router {
        let mut router = Router::new();
        router.register(Method::GET, "/hello", |_req, _params| {
            Response::new(StatusCode::Ok).with_body("hello")
        });
        router.register(Method::POST, "/echo", |req, _params| {
            Response::new(StatusCode::Ok).with_body_bytes(req.body().to_vec())
        });
        router
    }

    /// Atiende una conexión con `handle_connection_static` y retorna la respuesta cruda
    fn roundtrip(router: Router, max_request_bytes: usize, chunks: &[&[u8]]) -> String {
        let listener = ephemeral_listener();
        let addr = listener.local_addr().unwrap();
        let router = Arc::new(router);

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            Server::handle_connection_static(stream, router, max_request_bytes).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        for chunk in chunks {
            client.write_all(chunk).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        server.join().unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_handle_connection_ok() {
        let text = roundtrip(hello_router(), 1024, &[b"GET /hello HTTP/1.0\r\n\r\n"]);

        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(text.contains("X-Request-Id:"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn test_handle_connection_body_in_pieces() {
        let text = roundtrip(
            hello_router(),
            1024,
            &[b"POST /echo HTTP/1.0\r\nContent-Length: 10\r\n\r\n01234", b"56789"],
        );

        assert!(text.contains("200 OK"));
        assert!(text.ends_with("0123456789"));
    }

    #[test]
    fn test_handle_connection_parse_error() {
        let text = roundtrip(hello_router(), 1024, &[b"\x00\x01\x02\x03garbage"]);

        assert!(text.contains("400 Bad Request"));
        assert!(text.contains("Invalid:"));
    }

    #[test]
    fn test_handle_connection_too_large() {
        // El Content-Length declarado basta para rechazarlo sin leer el body
        let text = roundtrip(
            hello_router(),
            1024,
            &[b"POST /echo HTTP/1.0\r\nContent-Length: 5000\r\n\r\n"],
        );

        assert!(text.contains("413 Payload Too Large"));
    }

    #[test]
    fn test_read_request_huge_content_length() {
        let mut input: &[u8] =
            b"POST /execute HTTP/1.0\r\nContent-Length: 18446744073709551615\r\n\r\n";
        assert_eq!(
            Server::read_request(&mut input, DEFAULT_MAX_REQUEST_BYTES).unwrap(),
            ReadOutcome::TooLarge
        );

        let text = roundtrip(
            hello_router(),
            DEFAULT_MAX_REQUEST_BYTES,
            &[format!("POST /echo HTTP/1.0\r\nContent-Length: {}\r\n\r\n", usize::MAX).as_bytes()],
        );
        assert!(text.contains("413 Payload Too Large"));
    }

    #[test]
    fn test_handle_connection_peer_closed_immediately() {
        let listener = ephemeral_listener();
        let addr = listener.local_addr().unwrap();
        let router = Arc::new(Router::new());

        let t = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            Server::handle_connection_static(stream, router, 1024).unwrap();
        });

        drop(TcpStream::connect(addr).unwrap());
        t.join().unwrap();
    }

    #[test]
    fn test_read_request_stops_at_content_length() {
        let mut input: &[u8] = b"POST /x HTTP/1.0\r\nContent-Length: 3\r\n\r\nabc";
        let outcome = Server::read_request(&mut input, 1024).unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Request(b"POST /x HTTP/1.0\r\nContent-Length: 3\r\n\r\nabc".to_vec())
        );

        let mut empty: &[u8] = b"";
        assert_eq!(Server::read_request(&mut empty, 1024).unwrap(), ReadOutcome::Closed);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
        fail_start: bool,
    }

    impl Lifecycle for Recorder {
        fn before_start(&self) -> HookResult {
            self.events.lock().unwrap().push("start");
            if self.fail_start {
                return Err("refusing to start".into());
            }
            Ok(())
        }

        fn after_stop(&self) -> HookResult {
            self.events.lock().unwrap().push("stop");
            Ok(())
        }
    }

    #[test]
    fn test_run_until_stopped() {
        let recorder = Arc::new(Recorder::default());
        let mut server = Server::new(hello_router());
        server.add_lifecycle(recorder.clone());
        let addr = server.bind("127.0.0.1:0").unwrap();
        let stop = server.stop_handle();

        let handle = thread::spawn(move || server.run());

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET /hello HTTP/1.0\r\n\r\n").unwrap();
        let mut buf = String::new();
        client.read_to_string(&mut buf).unwrap();
        assert!(buf.contains("200 OK"));

        stop.stop();
        stop.stop();
        handle.join().unwrap().unwrap();

        assert!(stop.is_stopping());
        assert_eq!(*recorder.events.lock().unwrap(), vec!["start", "stop"]);
    }

    #[test]
    fn test_run_requires_bind() {
        let mut server = Server::new(Router::new());
        assert!(matches!(server.run(), Err(ServerError::NotBound)));
    }

    #[test]
    fn test_failed_start_hook_unwinds() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder {
            fail_start: true,
            ..Recorder::default()
        });

        let mut server = Server::new(Router::new());
        server.add_lifecycle(first.clone());
        server.add_lifecycle(second.clone());
        server.bind("127.0.0.1:0").unwrap();

        assert!(matches!(server.run(), Err(ServerError::Hook(_))));
        assert_eq!(*first.events.lock().unwrap(), vec!["start", "stop"]);
        assert_eq!(*second.events.lock().unwrap(), vec!["start"]);
    }

    #[test]
    fn test_stop_before_run() {
        let recorder = Arc::new(Recorder::default());
        let mut server = Server::new(Router::new());
        server.add_lifecycle(recorder.clone());
        server.bind("127.0.0.1:0").unwrap();

        server.stop_handle().stop();
        server.run().unwrap();
        assert_eq!(*recorder.events.lock().unwrap(), vec!["start", "stop"]);
    }
}
