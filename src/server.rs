//! The single-threaded readiness-driven event loop and acceptor.
//! One `mio::Poll` instance multiplexes both
//! listeners and every accepted connection; this is the direct
//! idiomatic-Rust analogue of the reference implementation's
//! `epoll_create1`/`epoll_ctl`/`epoll_wait` loop, with `Token`
//! standing in for the C code's `struct epoll_context *`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use crate::ids::TripIdAllocator;
use crate::session::Connection;
use crate::store::Store;

const INGEST_LISTENER: Token = Token(0);
const QUERY_LISTENER: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

pub struct Server {
    poll: Poll,
    ingest_listener: TcpListener,
    query_listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    store: Store,
    ids: TripIdAllocator,
}

impl Server {
    pub fn bind(ingest_addr: SocketAddr, query_addr: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;

        let mut ingest_listener = TcpListener::bind(ingest_addr)?;
        let mut query_listener = TcpListener::bind(query_addr)?;
        poll.registry()
            .register(&mut ingest_listener, INGEST_LISTENER, Interest::READABLE)?;
        poll.registry()
            .register(&mut query_listener, QUERY_LISTENER, Interest::READABLE)?;

        let store = Store::open_in_memory()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            poll,
            ingest_listener,
            query_listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            store,
            ids: TripIdAllocator::new(),
        })
    }

    pub fn ingest_addr(&self) -> io::Result<SocketAddr> {
        self.ingest_listener.local_addr()
    }

    pub fn query_addr(&self) -> io::Result<SocketAddr> {
        self.query_listener.local_addr()
    }

    /// Runs forever. The only suspension point is the `poll.poll`
    /// wait; every handler below runs to completion before the next
    /// event is dequeued.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(256);
        loop {
            self.poll.poll(&mut events, None)?;

            for event in events.iter() {
                match event.token() {
                    INGEST_LISTENER => self.accept_loop(true),
                    QUERY_LISTENER => self.accept_loop(false),
                    token => self.service(token),
                }
            }
        }
    }

    fn accept_loop(&mut self, ingest: bool) {
        loop {
            let accepted = if ingest {
                self.ingest_listener.accept()
            } else {
                self.query_listener.accept()
            };

            let (mut stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    return;
                }
            };

            let token = Token(self.next_token);
            self.next_token += 1;

            if let Err(e) = self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
            {
                log::warn!("acceptor could not register reads for {addr}: {e}");
                continue;
            }

            let conn = if ingest {
                Connection::ingest(stream)
            } else {
                Connection::query(stream)
            };
            log::debug!(
                "accepted {} connection from {addr}",
                if ingest { "ingest" } else { "query" }
            );
            self.connections.insert(token, conn);
        }
    }

    fn service(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let keep = match conn.readable(&self.store, &mut self.ids) {
            Ok(keep) => keep,
            Err(e) => {
                log::debug!("session {} read failed: {e}", token.0);
                false
            }
        };

        if !keep {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = self.poll.registry().deregister(&mut conn.stream);
            }
        }
    }
}
