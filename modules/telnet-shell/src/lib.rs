//! Blocking telnet session to the scope's root shell.

use anyhow::{anyhow, bail, Context, Result};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use telnet::{Action, Event, Telnet, TelnetOption};
use tracing::debug;
use trykeys_core::{FileContents, ShellProbe};

#[derive(Debug, Clone)]
pub struct TelnetOptions {
    pub connect_timeout: Duration,
    pub login_timeout: Duration,
    pub read_timeout: Duration,
    /// Last character of the shell prompt.
    pub prompt: char,
}

impl Default for TelnetOptions {
    fn default() -> Self {
        TelnetOptions {
            connect_timeout: Duration::from_millis(5000),
            login_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(1000),
            prompt: '#',
        }
    }
}

pub struct TelnetSession {
    conn: Telnet,
    opts: TelnetOptions,
}

impl TelnetSession {
    pub fn connect(host: &str, port: u16, opts: TelnetOptions) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("could not resolve {}:{}", host, port))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}:{}", host, port))?;
        let stream = TcpStream::connect_timeout(&addr, opts.connect_timeout)
            .with_context(|| format!("telnet connection to {} failed", addr))?;
        stream
            .set_write_timeout(Some(opts.read_timeout))
            .context("failed to set write timeout")?;
        let conn = Telnet::from_stream(Box::new(stream), 256);
        Ok(TelnetSession { conn, opts })
    }

    /// Connect and log in; echo is switched off once the prompt appears.
    pub fn open(host: &str, port: u16, username: &str, password: &str, opts: TelnetOptions) -> Result<Self> {
        let mut session = Self::connect(host, port, opts)?;
        session.login(username, password)?;
        Ok(session)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let deadline = Instant::now() + self.opts.login_timeout;
        let (banner, seen) = self.read_until(|s| s.to_lowercase().contains("login:"), deadline)?;
        if !seen {
            bail!("no login prompt from telnet server (got {:?})", banner);
        }
        self.write_line(username)?;

        let (_, seen) = self.read_until(|s| s.to_lowercase().contains("password"), deadline)?;
        if !seen {
            bail!("no password prompt from telnet server");
        }
        self.write_line(password)?;

        let prompt = self.opts.prompt;
        let (reply, _) = self.read_until(
            |s| s.contains(prompt) || s.to_lowercase().contains("incorrect"),
            deadline,
        )?;
        if !reply.contains(prompt) {
            bail!("telnet login rejected for user {}", username);
        }
        debug!(username, "telnet login succeeded");
        self.send("stty -echo")?;
        Ok(())
    }

    /// Run `command` and return its output without the trailing prompt. Output is empty when
    /// nothing arrives before the read timeout.
    pub fn send(&mut self, command: &str) -> Result<String> {
        self.write_line(command)?;
        let prompt = self.opts.prompt;
        let deadline = Instant::now() + self.opts.read_timeout;
        let (raw, complete) = self.read_until(|s| s.contains(prompt), deadline)?;
        if !complete {
            debug!(command, "telnet read timed out");
        }
        Ok(clean_output(&raw, command, prompt))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.conn
            .write(format!("{}\n", line).as_bytes())
            .context("telnet write failed")?;
        Ok(())
    }

    /// Collect data until `done` accepts the text or `deadline` passes.
    fn read_until<F: Fn(&str) -> bool>(&mut self, done: F, deadline: Instant) -> Result<(String, bool)> {
        let mut text = String::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok((text, false));
            }
            match self.conn.read_timeout(deadline - now) {
                Ok(Event::Data(data)) => {
                    text.push_str(&String::from_utf8_lossy(&data));
                    if done(&text) {
                        return Ok((text, true));
                    }
                }
                Ok(Event::Negotiation(action, option)) => self.refuse(action, option),
                Ok(_) => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => return Err(e).context("telnet read failed"),
            }
        }
    }

    /// Decline every option the server proposes.
    fn refuse(&mut self, action: Action, option: TelnetOption) {
        let reply = match action {
            Action::Will => Action::Dont,
            Action::Do => Action::Wont,
            _ => return,
        };
        let _ = self.conn.negotiate(&reply, option);
    }
}

impl ShellProbe for TelnetSession {
    fn probe(&mut self, path: &str) -> Result<FileContents> {
        let output = self.send(&format!("cat {}", path))?;
        Ok(FileContents::from_cat_output(output))
    }

    fn reboot(&mut self) -> Result<()> {
        self.write_line("reboot")
    }
}

/// Strip carriage returns, a leading command echo and the final prompt line.
pub fn clean_output(raw: &str, command: &str, prompt: char) -> String {
    let text = raw.replace('\r', "");
    let mut body = match text.rfind(prompt) {
        Some(idx) => {
            let head = &text[..idx];
            match head.rfind('\n') {
                Some(nl) => &head[..nl],
                None => head,
            }
        }
        None => text.as_str(),
    };
    if let Some(rest) = body.strip_prefix(command) {
        body = rest;
    }
    body.trim().to_string()
}
