//! Tiny, unassuming HTTP server

use std::fmt;
use std::io;
use std::net::SocketAddr;
use thread;
use tiny_http;

/// An incoming request.
pub type Request = tiny_http::Request;
/// An outgoing response with an in-memory body.
pub type Response = tiny_http::Response<io::Cursor<Vec<u8>>>;
/// A request or response header.
pub type Header = tiny_http::Header;
/// A response status code.
pub type StatusCode = tiny_http::StatusCode;

/// Request handler, called once per request on the server thread.
pub trait Handler: Sync + Send {
    /// Answer `request`. The handler must respond; dropping the request
    /// answers with an empty 500.
    fn handle(&self, request: Request) -> ();
}

/// Failure to start a server.
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be bound.
    Bind {
        /// The address asked for.
        host_port: String,
        /// Why binding failed.
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Bind {
                ref host_port,
                ref reason,
            } => write!(f, "could not listen on {}: {}", host_port, reason),
        }
    }
}

impl ::std::error::Error for Error {}

/// Single threaded HTTP server.
pub struct Server {
    /// Thread handle for the operating HTTP server.
    thread: thread::ThreadHandle,
    local_addr: Option<SocketAddr>,
}

fn http_server<H>(signal: thread::Signal, tiny_http_server: tiny_http::Server, handler: H) -> ()
where
    H: Handler,
{
    while !signal.is_stopped() {
        match tiny_http_server.recv_timeout(thread::POLL_INTERVAL) {
            Ok(Some(request)) => handler.handle(request),
            Ok(None) => {}
            Err(e) => {
                error!("Failed during recv_timeout {:?}", e);
                break;
            }
        }
    }
    trace!("http server stopped");
}

impl Server {
    /// Bind `host_port` and serve requests with `handler` on a new thread.
    pub fn new<H>(host_port: String, handler: H) -> Result<Server, Error>
    where
        H: Handler + 'static,
    {
        let tiny_http_server = match tiny_http::Server::http(host_port.as_str()) {
            Ok(srv) => srv,
            Err(e) => {
                return Err(Error::Bind {
                    host_port: host_port,
                    reason: e.to_string(),
                })
            }
        };
        let local_addr = tiny_http_server.server_addr().to_ip();
        Ok(Server {
            thread: thread::spawn(move |signal| {
                http_server(signal, tiny_http_server, handler)
            }),
            local_addr: local_addr,
        })
    }

    /// The address actually bound, useful when asking for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Build a response with the given status, content type and body.
pub fn response(status: u16, content_type: &str, body: Vec<u8>) -> Response {
    let mut response = tiny_http::Response::from_data(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        response.add_header(header);
    }
    response
}

/// Graceful shutdown support for Server.
impl thread::Stoppable for Server {
    fn join(self) {
        self.thread.join();
    }

    fn shutdown(self) {
        self.thread.shutdown();
    }
}
