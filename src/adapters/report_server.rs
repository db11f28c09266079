//! TCP report server.
//!
//! Each accepted connection gets one [`PowerReport`] (8 bytes) and is
//! closed.  The listener is non-blocking and serviced from the main loop
//! by [`ReportServer::poll`]; it never touches interrupt context.
//!
//! Works unchanged on ESP-IDF (lwIP sockets behind `std::net`) and on the
//! host.  Pass port `0` to let the OS pick a free port and read it back
//! with [`ReportServer::local_addr`].

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info, warn};

use crate::meter::MeterAttributes;
use crate::report::PowerReport;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct ReportServer {
    listener: TcpListener,
    served: u32,
    failed: u32,
}

impl ReportServer {
    /// Bind `0.0.0.0:<port>` in non-blocking mode.
    pub fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        listener.set_nonblocking(true)?;
        info!("ReportServer: listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            served: 0,
            failed: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Reports sent / connections dropped on a write error.
    pub fn stats(&self) -> (u32, u32) {
        (self.served, self.failed)
    }

    /// Serve at most one pending connection.  Returns `true` if a report
    /// was delivered.
    pub fn poll(&mut self, attrs: &MeterAttributes, scale: u32) -> bool {
        let (stream, peer) = match self.listener.accept() {
            Ok(conn) => conn,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return false,
            Err(e) => {
                warn!("ReportServer: accept error: {}", e);
                return false;
            }
        };

        let report = PowerReport::sample(attrs, scale);
        match send(stream, report) {
            Ok(()) => {
                debug!(
                    "ReportServer: {} <- rate={} cumulative={}",
                    peer, report.rate, report.cumulative
                );
                self.served = self.served.wrapping_add(1);
                true
            }
            Err(e) => {
                warn!("ReportServer: write to {} failed: {}", peer, e);
                self.failed = self.failed.wrapping_add(1);
                false
            }
        }
    }
}

fn send(mut stream: TcpStream, report: PowerReport) -> io::Result<()> {
    // Accepted sockets may inherit non-blocking mode from the listener.
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    stream.write_all(&report.to_bytes())?;
    stream.flush()
}
