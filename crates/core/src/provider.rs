//! The KPI provider contract: document text in, raw response text out.
//!
//! A provider is treated as an opaque and fallible producer. Transport
//! failures are retried with a doubling delay; whatever text finally comes
//! back goes through [`ingest_response`], which never fails hard.

use crate::error::{Error, Result};
use crate::ingest::{ingest_response, IngestOutcome};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// Instructions sent ahead of the structured document.
pub const EXTRACTION_PROMPT: &str = "\
You are an expert at extracting specific metrics from dealership marketing
reports. Return ONLY a JSON object with these keys (use placeholders when the
metric truly is missing):

- store_name, date_range
- rsa_impr, rsa_clicks, rsa_cpc, rsa_conv, rsa_cost_conv
- pmax_impr, pmax_clicks, pmax_cpc, pmax_conv, pmax_cost_conv
- pmax_vla_impr, pmax_vla_clicks, pmax_vla_cpc, pmax_vla_conv, pmax_vla_cost_conv
- dg_impr, dg_clicks, dg_cpm, dg_cpc, dg_conv
- dv_views, dv_viewrate, dv_cpc, dv_cpm (only if actual numbers appear)
- social_reach, social_impr, social_clicks, social_cpc, social_vdp
- has_bcdf (true/false) and, if true: bcdf_tactics, bcdf_impr, bcdf_clicks,
  bcdf_cpc, bcdf_conv, bcdf_vdp

Placeholders: [x,xxx] for counts, [xxx] for clicks, $x.xx for costs,
[xx] for conversions, [xx.xx%] for rates.
";

/// Documents longer than this are cut before being sent.
pub const MAX_DOCUMENT_CHARS: usize = 50_000;

/// Something that turns a structured deck document into a KPI response.
pub trait KpiProvider {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Send the prompt and document, returning the raw response text.
    fn complete(&self, prompt: &str, document: &str) -> Result<String>;
}

/// Bounded retry with a delay that doubles after each failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` until it succeeds or attempts run out, calling `sleep`
    /// between attempts.
    pub fn run<T, F, S>(&self, mut op: F, mut sleep: S) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        S: FnMut(Duration),
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        let delay = self.delay_after(attempt);
                        log::warn!(
                            "Attempt {}/{} failed: {}; retrying in {:?}",
                            attempt,
                            self.max_attempts,
                            last_error,
                            delay
                        );
                        sleep(delay);
                    }
                }
            }
        }
        Err(Error::ProviderError {
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}

/// Cut a document to `max_chars`, marking the cut.
pub fn truncate_document(document: &str, max_chars: usize) -> String {
    match document.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[Truncated]", &document[..idx]),
        None => document.to_string(),
    }
}

/// Ask a provider for KPIs with retries, sleeping with `sleep`.
///
/// Transport failures are fatal once retries are exhausted. A response
/// without usable JSON is not: it comes back as an [`IngestOutcome`]
/// carrying the failure notice.
pub fn request_kpis_with<S>(
    provider: &dyn KpiProvider,
    document: &str,
    policy: &RetryPolicy,
    sleep: S,
) -> Result<IngestOutcome>
where
    S: FnMut(Duration),
{
    let document = truncate_document(document, MAX_DOCUMENT_CHARS);
    log::debug!(
        "Sending {} chars to provider '{}'",
        document.len(),
        provider.name()
    );
    let response = policy.run(
        |_| provider.complete(EXTRACTION_PROMPT, &document),
        sleep,
    )?;
    Ok(ingest_response(&response))
}

/// Ask a provider for KPIs with retries, sleeping on the current thread.
pub fn request_kpis(
    provider: &dyn KpiProvider,
    document: &str,
    policy: &RetryPolicy,
) -> Result<IngestOutcome> {
    request_kpis_with(provider, document, policy, std::thread::sleep)
}

/// A provider backed by an external command.
///
/// The command gets the prompt and document on stdin and must print its
/// response on stdout. A non-zero exit counts as a transport failure.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build from a whitespace-separated command line. No shell quoting
    /// is applied.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::ProviderError {
                attempts: 0,
                message: "empty provider command".to_string(),
            })?;
        Ok(Self::new(program).with_args(parts))
    }
}

impl KpiProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.program
    }

    fn complete(&self, prompt: &str, document: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from its own thread while the output pipes drain, and
        // always reap the child before reporting a write failure.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                let Some(mut stdin) = stdin else {
                    return Ok(());
                };
                stdin.write_all(prompt.as_bytes())?;
                stdin.write_all(b"\n\n")?;
                stdin.write_all(document.as_bytes())
            });
            let output = child.wait_with_output();
            (writer.join(), output)
        });

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProviderError {
                attempts: 1,
                message: format!("'{}' exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }

        match written {
            Ok(Ok(())) => {}
            // The command finished without reading all of its input.
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                log::debug!("'{}' closed stdin early", self.program);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(Error::ProviderError {
                    attempts: 1,
                    message: format!("stdin writer for '{}' panicked", self.program),
                });
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
