//! Pseudo-terminal backed adb sessions
//!
//! adb only prompts (`mv -i`) and only redraws progress when its stdio is a
//! terminal. The child gets the slave side of a fresh pty as stdin, stdout
//! and stderr; the parent keeps the master, wrapped in `AsyncFd` so reads
//! and writes go through tokio's reactor.
//!
//! One task owns the master, the child and both channels. Output reads and
//! the child's exit are observed in the same `select!`, so output that is
//! still buffered in the terminal when the child exits is delivered before
//! the stream ends.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use buddy_core::prelude::*;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg};
use tokio::io::unix::AsyncFd;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::interactive::{CancelHandle, InteractiveCommand, SessionIo};
use crate::process::spawn_error;

const READ_BUFFER_SIZE: usize = 4096;

/// Wide enough that adb does not elide file names in progress lines
const TERMINAL_COLUMNS: u16 = 256;
const TERMINAL_ROWS: u16 = 24;

/// How long to keep reading after the child exits without new output.
/// A server forked by adb can keep the slave open forever.
const EXIT_DRAIN_QUIET: Duration = Duration::from_millis(50);

/// Spawn `executable args` attached to a new pseudo-terminal.
///
/// Fails without spawning anything when no terminal can be allocated.
pub(crate) fn spawn_session(
    executable: &Path,
    args: &[String],
    terminal_type: &str,
) -> Result<InteractiveCommand> {
    let winsize = Winsize {
        ws_row: TERMINAL_ROWS,
        ws_col: TERMINAL_COLUMNS,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let OpenptyResult { master, slave } = openpty(&winsize, None)
        .map_err(|e| Error::pty(format!("failed to open pty: {}", e)))?;

    set_cloexec(&master)?;
    set_cloexec(&slave)?;
    configure_slave(&slave)?;

    debug!("Spawning interactive: adb {}", args.join(" "));

    let stdin = slave.try_clone().context("failed to duplicate pty slave")?;
    let stdout = slave.try_clone().context("failed to duplicate pty slave")?;

    let child = {
        let mut command = Command::new(executable);
        command
            .args(args)
            .env("TERM", terminal_type)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(slave))
            .kill_on_drop(true);
        command.spawn().map_err(spawn_error)?
        // `command` drops here, closing the parent's copies of the slave
    };

    let pid = child.id();
    info!("Interactive adb started with PID: {:?}", pid);

    set_nonblocking(&master)?;
    let master = AsyncFd::new(File::from(master))
        .map_err(|e| Error::pty(format!("failed to register pty: {}", e)))?;

    let (command, io) = InteractiveCommand::channel(pid);
    tokio::spawn(drive_session(child, master, io));
    Ok(command)
}

/// Own the child and the master until the session is over.
async fn drive_session(mut child: Child, master: AsyncFd<File>, io: SessionIo) {
    let SessionIo {
        chunks,
        mut input,
        cancel,
        exit,
    } = io;
    let mut decoder = Utf8Decoder::default();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut input_open = true;
    let mut output_open = true;

    let reaped = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Interactive session cancelled");
                break false;
            }

            _ = chunks.closed() => {
                debug!("Interactive session consumer dropped");
                break false;
            }

            read = read_chunk(&master, &mut buf), if output_open => match read {
                Ok(Some(n)) => {
                    if !forward(&chunks, &cancel, &mut decoder, &buf[..n]).await {
                        break false;
                    }
                }
                Ok(None) => {
                    trace!("pty reached end of output");
                    output_open = false;
                    if let Err(e) = decoder.finish() {
                        cancel.send(&chunks, Err(e)).await;
                        break false;
                    }
                }
                Err(e) => {
                    error!("pty read failed: {}", e);
                    cancel.send(&chunks, Err(Error::Io(e))).await;
                    break false;
                }
            },

            status = child.wait() => {
                match status {
                    Ok(status) => info!("Interactive adb exited with status: {:?}", status),
                    Err(e) => error!("Error waiting for interactive adb: {}", e),
                }
                if output_open {
                    drain_after_exit(&master, &chunks, &cancel, &mut decoder, &mut buf).await;
                }
                break true;
            }

            line = input.recv(), if input_open => match line {
                Some(line) => {
                    trace!("pty input: {:?}", line);
                    if let Err(e) = write_all(&master, line.as_bytes()).await {
                        warn!("Failed to write to pty: {}", e);
                    }
                }
                None => input_open = false,
            },
        }
    };

    if !reaped {
        terminate(&mut child).await;
    }
    drop(master);
    exit.mark_exited();
}

/// Read whatever the terminal still holds after the child exited.
async fn drain_after_exit(
    master: &AsyncFd<File>,
    chunks: &mpsc::Sender<Result<String>>,
    cancel: &CancelHandle,
    decoder: &mut Utf8Decoder,
    buf: &mut [u8],
) {
    loop {
        match tokio::time::timeout(EXIT_DRAIN_QUIET, read_chunk(master, buf)).await {
            Ok(Ok(Some(n))) => {
                if !forward(chunks, cancel, decoder, &buf[..n]).await {
                    return;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                debug!("pty read after exit failed: {}", e);
                break;
            }
            Err(_) => {
                trace!("pty quiet after exit");
                break;
            }
        }
    }

    if let Err(e) = decoder.finish() {
        cancel.send(chunks, Err(e)).await;
    }
}

/// Decode and send one read. Returns false when the session must end.
///
/// A consumer that stops reading must not keep the child alive, so a send
/// blocked on a full channel gives way to cancellation.
async fn forward(
    chunks: &mpsc::Sender<Result<String>>,
    cancel: &CancelHandle,
    decoder: &mut Utf8Decoder,
    bytes: &[u8],
) -> bool {
    match decoder.decode(bytes) {
        Ok(text) if text.is_empty() => true,
        Ok(text) => {
            trace!("pty output: {:?}", text);
            cancel.send(chunks, Ok(text)).await
        }
        Err(e) => {
            warn!("Interactive adb produced invalid UTF-8");
            cancel.send(chunks, Err(e)).await;
            false
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("Interactive adb already exited: {:?}", status);
        return;
    }
    info!("Killing interactive adb");
    // kill() also waits, so the child is reaped here
    if let Err(e) = child.kill().await {
        error!("Failed to kill interactive adb: {}", e);
    }
}

/// Read one chunk. `Ok(None)` means every slave descriptor is closed.
async fn read_chunk(master: &AsyncFd<File>, buf: &mut [u8]) -> io::Result<Option<usize>> {
    loop {
        let mut guard = master.readable().await?;
        match guard.try_io(|inner| inner.get_ref().read(buf)) {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(n)) => return Ok(Some(n)),
            // Linux reports a hung-up terminal as EIO
            Ok(Err(e)) if e.raw_os_error() == Some(libc_eio()) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(_would_block) => continue,
        }
    }
}

async fn write_all(master: &AsyncFd<File>, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        let mut guard = master.writable().await?;
        match guard.try_io(|inner| inner.get_ref().write(bytes)) {
            Ok(Ok(n)) => bytes = &bytes[n..],
            Ok(Err(e)) => return Err(e),
            Err(_would_block) => continue,
        }
    }
    Ok(())
}

fn libc_eio() -> i32 {
    nix::errno::Errno::EIO as i32
}

/// No local echo and no `\n` to `\r\n` translation on the child's side.
fn configure_slave(slave: &OwnedFd) -> Result<()> {
    let mut attrs =
        tcgetattr(slave).map_err(|e| Error::pty(format!("tcgetattr failed: {}", e)))?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    attrs.output_flags.remove(OutputFlags::ONLCR);
    tcsetattr(slave, SetArg::TCSANOW, &attrs)
        .map_err(|e| Error::pty(format!("tcsetattr failed: {}", e)))?;
    Ok(())
}

fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map_err(|e| Error::pty(format!("fcntl F_SETFD failed: {}", e)))?;
    Ok(())
}

fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)
        .map_err(|e| Error::pty(format!("fcntl F_GETFL failed: {}", e)))?;

    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;

    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))
        .map_err(|e| Error::pty(format!("fcntl F_SETFL failed: {}", e)))?;

    Ok(())
}

/// Incremental UTF-8 decoding across read boundaries.
///
/// A multi-byte character split between two reads is held back until its
/// remaining bytes arrive; an invalid sequence is an error.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => return Err(Error::NonDecodableOutput),
        };

        let rest = self.pending.split_off(valid_up_to);
        let complete = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(complete).map_err(|_| Error::NonDecodableOutput)
    }

    /// Fail if the output ended in the middle of a character.
    fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            self.pending.clear();
            Err(Error::NonDecodableOutput)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_whole_chunks() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"[ 39%] x.iso").unwrap(), "[ 39%] x.iso");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_split_character() {
        let bytes = "Mélodie".as_bytes();
        // 'é' is two bytes starting at index 1
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&bytes[..2]).unwrap(), "M");
        assert_eq!(decoder.decode(&bytes[2..]).unwrap(), "élodie");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_rejects_invalid() {
        let mut decoder = Utf8Decoder::default();
        assert!(matches!(
            decoder.decode(&[b'a', 0xFF, b'b']),
            Err(Error::NonDecodableOutput)
        ));
    }

    #[test]
    fn test_decoder_truncated_at_end() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[0xC3]).unwrap(), "");
        assert!(matches!(decoder.finish(), Err(Error::NonDecodableOutput)));
    }

    #[tokio::test]
    async fn test_session_echoes_and_exits() {
        let command = spawn_session(
            Path::new("/bin/sh"),
            &["-c".to_string(), "read answer; echo \"got $answer\"".to_string()],
            "xterm-256color",
        );
        let mut command = command.expect("pty available");
        command.write("n");

        let mut output = String::new();
        while let Some(chunk) = command.next_chunk().await {
            output.push_str(&chunk.unwrap());
        }
        assert!(output.contains("got n"), "output was {output:?}");

        command.exit_signal().wait().await;
        assert!(command.has_exited());
    }

    #[tokio::test]
    async fn test_session_sees_a_terminal() {
        let mut command = spawn_session(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                "if [ -t 0 ] && [ -t 1 ]; then echo tty $TERM; else echo notty; fi".to_string(),
            ],
            "dumb-test",
        )
        .expect("pty available");

        let mut output = String::new();
        while let Some(chunk) = command.next_chunk().await {
            output.push_str(&chunk.unwrap());
        }
        assert_eq!(output.trim(), "tty dumb-test");
    }

    #[tokio::test]
    async fn test_cancel_kills_child_while_consumer_is_idle() {
        // Fills the chunk channel long before anyone reads it
        let command = spawn_session(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                "while true; do echo '[ 10%] flood.iso'; done".to_string(),
            ],
            "xterm-256color",
        )
        .expect("pty available");
        let exit = command.exit_signal();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!command.has_exited());

        command.cancel();
        tokio::time::timeout(Duration::from_secs(5), exit.wait())
            .await
            .expect("cancel should end the session without a reader");
        assert!(command.has_exited());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let result = spawn_session(Path::new("/nonexistent/adb"), &[], "xterm");
        assert!(matches!(result, Err(Error::AdbNotFound)));
    }
}
