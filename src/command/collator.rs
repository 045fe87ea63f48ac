use crate::amf::AmfValue;
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Collects interesting commands decoded from one TCP flow.
///
/// Shared by every message decoder of the flow, so updates are serialized
/// behind a mutex. Once both a `connect` options map and a non-empty `play`
/// target have been seen, a single `rtmpdump` replay command is pushed on
/// the result channel; the lock is held across the send so the emitted flag
/// and the emission are atomic.
pub struct CommandCollator {
    results: mpsc::Sender<String>,
    state: Mutex<CollatorState>,
}

#[derive(Default)]
struct CollatorState {
    /// Options argument of the "connect" command, once seen
    connect: Option<Vec<(String, AmfValue)>>,

    /// Target of the "play" command, once seen
    play: Option<String>,

    /// Set when the replay command has been emitted
    complete: bool,
}

impl CommandCollator {
    pub fn new(results: mpsc::Sender<String>) -> Self {
        CommandCollator {
            results,
            state: Mutex::new(CollatorState::default()),
        }
    }

    /// Record one decoded command value list `[name, transaction_id, arg0, ..]`.
    ///
    /// `connect` captures `arg0` when it is an object; `play` captures
    /// `arg0` when it is a string; everything else is ignored. Unexpected
    /// shapes are ignored rather than rejected, real-world streams are
    /// permissive.
    pub async fn add(&self, values: &[AmfValue]) {
        if values.is_empty() {
            return;
        }
        trace!("collator add {:?}", values);

        let mut state = self.state.lock().await;

        if let Some(name) = values[0].as_str() {
            if values.len() >= 3 {
                match name {
                    "connect" => match &values[2] {
                        AmfValue::Object(props) => state.connect = Some(props.clone()),
                        other => debug!("connect argument is not an object: {}", other),
                    },
                    "play" => {
                        if let Some(target) = values[2].as_str() {
                            state.play = Some(target.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        if state.complete {
            return;
        }
        let command = match (&state.connect, state.play.as_deref()) {
            (Some(connect), Some(play)) if !play.is_empty() => replay_command(connect, play),
            _ => return,
        };

        // Emit as soon as we have enough information, exactly once.
        state.complete = true;
        if self.results.send(command).await.is_err() {
            debug!("result sink closed, dropping command");
        }
    }

    /// Called as the TCP flow goes away. Nothing is flushed: a flow that
    /// never completed a connect+play pair emits nothing.
    pub fn finish(&self) {}
}

/// Combine the captured connect options and play target into an `rtmpdump`
/// invocation that would re-fetch the same stream.
fn replay_command(connect: &[(String, AmfValue)], play: &str) -> String {
    let mut cmd = String::from("rtmpdump");

    if let Some(tc_url) = lookup(connect, "tcUrl") {
        cmd.push_str(&flag("r", &tc_url.to_string()));
    }
    cmd.push_str(&flag("y", play));

    let mut keys: Vec<&str> = connect.iter().map(|(k, _)| k.as_str()).collect();
    keys.sort_unstable();
    for key in keys {
        let short = match key {
            "app" => "a",
            "flashVer" => "f",
            "pageUrl" => "p",
            "tcUrl" => "t",
            _ => continue,
        };
        if let Some(value) = lookup(connect, key) {
            cmd.push_str(&flag(short, &value.to_string()));
        }
    }

    cmd.push_str(&format!(" -R -o '{}'", output_filename(play)));
    cmd
}

fn lookup<'a>(props: &'a [(String, AmfValue)], key: &str) -> Option<&'a AmfValue> {
    props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn flag(name: &str, value: &str) -> String {
    format!(" -{} '{}'", name, value)
}

/// Derive the output filename from the play target: lexically clean the
/// path, take its final component, and cut at the first '?'.
///
/// input:  'some/long/path?optional&args'
/// output: 'path'
fn output_filename(play: &str) -> String {
    let cleaned = clean_path(play);
    let base = cleaned.rsplit('/').next().unwrap_or("");
    let base = if base.is_empty() { cleaned.as_str() } else { base };
    base.split('?').next().unwrap_or("").to_string()
}

/// Lexical path cleanup: drops empty and "." segments and resolves ".."
/// against earlier segments.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|s| *s != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return if rooted { "/".to_string() } else { ".".to_string() };
    }
    let mut out = String::new();
    if rooted {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    out
}
