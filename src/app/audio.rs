use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AudioError {
    #[error("failed to launch audio player {player}: {source}")]
    Spawn {
        player: String,
        #[source]
        source: std::io::Error,
    },
}

/// Playback backend for a story's audio track.
///
/// The viewer holds at most one track at a time and always calls `stop`
/// before starting the next one.
pub(crate) trait AudioSink {
    fn start(&mut self, url: &str, looped: bool) -> Result<(), AudioError>;
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn start(&mut self, url: &str, looped: bool) -> Result<(), AudioError> {
        (**self).start(url, looped)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }
}

/// Audio disabled.
#[derive(Debug, Default)]
pub(crate) struct SilentAudio;

impl AudioSink for SilentAudio {
    fn start(&mut self, _url: &str, _looped: bool) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

/// Plays tracks through an external player process (mpv by default).
#[derive(Debug)]
pub(crate) struct ProcessAudio {
    player: PathBuf,
    child: Option<Child>,
}

impl ProcessAudio {
    pub(crate) fn new(player: PathBuf) -> Self {
        Self {
            player,
            child: None,
        }
    }

    fn signal(&mut self, _signal: PlayerSignal) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            self.child = None;
            return;
        }
        #[cfg(unix)]
        {
            let signum = match _signal {
                PlayerSignal::Pause => libc::SIGSTOP,
                PlayerSignal::Resume => libc::SIGCONT,
            };
            let pid = child.id() as libc::pid_t;
            if unsafe { libc::kill(pid, signum) } != 0 {
                tracing::debug!(pid, signum, "failed to signal audio player");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PlayerSignal {
    Pause,
    Resume,
}

pub(crate) fn player_args(url: &str, looped: bool) -> Vec<String> {
    let mut args = vec!["--no-video".to_string(), "--really-quiet".to_string()];
    if looped {
        args.push("--loop=inf".to_string());
    }
    args.push(url.to_string());
    args
}

impl AudioSink for ProcessAudio {
    fn start(&mut self, url: &str, looped: bool) -> Result<(), AudioError> {
        self.stop();
        let child = ProcessCommand::new(&self.player)
            .args(player_args(url, looped))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                player: self.player.display().to_string(),
                source,
            })?;
        tracing::debug!(pid = child.id(), url, "audio player started");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // A stopped process must be continued before it can act on the kill.
        #[cfg(unix)]
        unsafe {
            let _ = libc::kill(child.id() as libc::pid_t, libc::SIGCONT);
        }
        let _ = child.kill();
        let _ = child.wait();
    }

    fn pause(&mut self) {
        self.signal(PlayerSignal::Pause);
    }

    fn resume(&mut self) {
        self.signal(PlayerSignal::Resume);
    }
}

impl Drop for ProcessAudio {
    fn drop(&mut self) {
        self.stop();
    }
}
