use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

/// Declared capacity for workers with no entry in the hosts-info file.
pub const DEFAULT_DECLARATION: (u32, i32) = (1, 1);

/// Static per-worker configuration: declared CPU count and power index.
///
/// The file holds one worker per line, `<dotted-ip> <numCpus> <powerIndex>`.
/// `#` starts a comment; blank lines are skipped; malformed lines are logged
/// and skipped. The file is read on first lookup and re-read whenever its
/// mtime changes, so workers can be added without restarting the dispatcher.
#[derive(Debug)]
pub struct HostsInfoFile {
    path: PathBuf,
    cache: Mutex<Cache>,
}

#[derive(Debug, Default)]
struct Cache {
    loaded_at: Option<SystemTime>,
    entries: HashMap<Ipv4Addr, (u32, i32)>,
    missing_logged: bool,
}

impl HostsInfoFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Declared `(numCpus, powerIndex)` for a worker, `(1, 1)` if unknown.
    pub fn declared(&self, ip: Ipv4Addr) -> (u32, i32) {
        let mut cache = self.cache.lock().expect("hosts-info cache lock poisoned");
        self.refresh(&mut cache);
        cache.entries.get(&ip).copied().unwrap_or(DEFAULT_DECLARATION)
    }

    fn refresh(&self, cache: &mut Cache) {
        match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => {
                if cache.loaded_at == Some(mtime) {
                    return;
                }
                match fs::read_to_string(&self.path) {
                    Ok(contents) => {
                        cache.entries = parse(&contents);
                        cache.loaded_at = Some(mtime);
                        cache.missing_logged = false;
                        tracing::info!(
                            path = %self.path.display(),
                            hosts = cache.entries.len(),
                            "Loaded hosts-info file"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(path = %self.path.display(), error = %e, "Failed to read hosts-info file");
                    }
                }
            }
            Err(e) => {
                if !cache.missing_logged {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Hosts-info file unavailable, using default declarations"
                    );
                    cache.missing_logged = true;
                }
                cache.entries.clear();
                cache.loaded_at = None;
            }
        }
    }
}

fn parse(contents: &str) -> HashMap<Ipv4Addr, (u32, i32)> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .filter_map(|line| match parse_line(line) {
            Some(entry) => Some(entry),
            None => {
                tracing::warn!(line, "Skipping malformed hosts-info line");
                None
            }
        })
        .collect()
}

fn parse_line(line: &str) -> Option<(Ipv4Addr, (u32, i32))> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return None;
    }
    let ip: Ipv4Addr = fields[0].parse().ok()?;
    let num_cpus: u32 = fields[1].parse().ok()?;
    let power_index: i32 = fields[2].parse().ok()?;
    if num_cpus == 0 || power_index <= 0 {
        return None;
    }
    Some((ip, (num_cpus, power_index)))
}
