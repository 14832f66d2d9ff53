use std::net::Ipv4Addr;
use std::str::SplitWhitespace;

use crate::error::{DispatchError, Result};

/// A parsed request line. The grammar is line-oriented text:
///
/// - `host` — request a CPU; the connection stays open as the liveness token
/// - `load <host-ip> <ld1> <ld5> <ld10>` — worker heartbeat with raw load averages
/// - `status <host-ip> up|down [n <numCpus>] [p <powerIndex>]` — administrative availability
/// - `monitor` — request a snapshot of the store
///
/// Trailing tokens after `host` and `monitor` are tolerated (older clients
/// append their own address). The `n`/`p` fields of `status` are parsed but
/// ignored by the dispatcher; declared capacity comes from the hosts-info file.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Host,
    Load {
        host: Ipv4Addr,
        ld1: f32,
        ld5: f32,
        ld10: f32,
    },
    Status {
        host: Ipv4Addr,
        up: bool,
        num_cpus: Option<u32>,
        power_index: Option<i32>,
    },
    Monitor,
}

impl Request {
    pub fn parse(line: &str) -> Result<Request> {
        let malformed = || DispatchError::MalformedRequest(line.to_string());
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("host") => Ok(Request::Host),
            Some("monitor") => Ok(Request::Monitor),
            Some("load") => {
                let host = next_field(&mut tokens, malformed)?;
                let ld1 = next_field(&mut tokens, malformed)?;
                let ld5 = next_field(&mut tokens, malformed)?;
                let ld10 = next_field(&mut tokens, malformed)?;
                if tokens.next().is_some() {
                    return Err(malformed());
                }
                Ok(Request::Load {
                    host,
                    ld1,
                    ld5,
                    ld10,
                })
            }
            Some("status") => {
                let host = next_field(&mut tokens, malformed)?;
                let up = match tokens.next() {
                    Some("up") => true,
                    Some("down") => false,
                    _ => return Err(malformed()),
                };
                let mut num_cpus = None;
                let mut power_index = None;
                while let Some(key) = tokens.next() {
                    match key {
                        "n" => num_cpus = Some(next_field(&mut tokens, malformed)?),
                        "p" => power_index = Some(next_field(&mut tokens, malformed)?),
                        _ => return Err(malformed()),
                    }
                }
                Ok(Request::Status {
                    host,
                    up,
                    num_cpus,
                    power_index,
                })
            }
            _ => Err(malformed()),
        }
    }
}

fn next_field<T, E>(tokens: &mut SplitWhitespace<'_>, malformed: E) -> Result<T>
where
    T: std::str::FromStr,
    E: Fn() -> DispatchError,
{
    tokens
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(malformed)
}
