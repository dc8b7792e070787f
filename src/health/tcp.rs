use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::error::HealthError;
use super::Probe;

pub struct TcpProbe {
    name: String,
    host: String,
    port: u16,
}

impl TcpProbe {
    pub fn new(name: String, host: String, port: u16) -> Self {
        Self { name, host, port }
    }
}

impl Probe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, timeout: Duration) -> Result<(), HealthError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| HealthError::Tcp(self.name.clone(), err))?
            .next()
            .ok_or_else(|| {
                HealthError::Tcp(
                    self.name.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
                )
            })?;
        TcpStream::connect_timeout(&addr, timeout)
            .map(|_| ())
            .map_err(|err| HealthError::Tcp(self.name.clone(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_to_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new("db".into(), "127.0.0.1".into(), port);
        assert!(probe.check(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn fails_when_nothing_listens() {
        let probe = TcpProbe::new("db".into(), "127.0.0.1".into(), 1);
        assert!(probe.check(Duration::from_millis(200)).is_err());
    }
}
