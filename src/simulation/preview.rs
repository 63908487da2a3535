use crate::simulation::ship_definition::ShipDefinition;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

const MESSAGE_QUEUE_CAPACITY: usize = 64;

/// What the owner asks of the scan thread. The request slot holds at most
/// one pending message; a newer request overwrites an unserved older one.
#[derive(Debug, Clone)]
pub enum PreviewRequest {
    SetDirectory(PathBuf),
    Exit,
}

#[derive(Debug, Clone)]
pub struct ShipPreviewMetadata {
    pub path: PathBuf,
    pub ship_name: String,
    pub author: Option<String>,
}

#[derive(Debug)]
pub enum PreviewMessage {
    DirScanCompleted { ship_files: Vec<PathBuf> },
    DirScanError { message: String },
    PreviewReady { index: usize, metadata: ShipPreviewMetadata },
    PreviewError { index: usize, message: String },
}

type RequestSlot = Arc<(Mutex<Option<PreviewRequest>>, Condvar)>;

/// The ship-preview scanning worker: walks a directory of ship files on
/// its own thread, loading one preview at a time, and posts messages on a
/// bounded queue the UI drains on its own cadence. Cancellation is polled
/// between file loads, so a new `SetDirectory` aborts the current scan at
/// the next file boundary.
pub struct ShipPreviewScanner {
    request_slot: RequestSlot,
    receiver: Receiver<PreviewMessage>,
    worker: Option<JoinHandle<()>>,
}

impl ShipPreviewScanner {
    pub fn new() -> Self {
        let request_slot: RequestSlot = Arc::new((Mutex::new(None), Condvar::new()));
        let (sender, receiver) = std::sync::mpsc::sync_channel(MESSAGE_QUEUE_CAPACITY);

        let worker_slot = request_slot.clone();
        let worker = std::thread::spawn(move || run_preview_thread(worker_slot, sender));

        ShipPreviewScanner {
            request_slot,
            receiver,
            worker: Some(worker),
        }
    }

    pub fn set_directory(&self, directory: impl Into<PathBuf>) {
        self.post_request(PreviewRequest::SetDirectory(directory.into()));
    }

    /// Non-blocking; the owner polls on its own schedule.
    pub fn poll_message(&self) -> Option<PreviewMessage> {
        self.receiver.try_recv().ok()
    }

    fn post_request(&self, request: PreviewRequest) {
        let (slot, condvar) = &*self.request_slot;
        let mut pending = slot.lock().unwrap();
        // Latest wins
        *pending = Some(request);
        condvar.notify_one();
    }
}

impl Default for ShipPreviewScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShipPreviewScanner {
    fn drop(&mut self) {
        self.post_request(PreviewRequest::Exit);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_preview_thread(request_slot: RequestSlot, sender: SyncSender<PreviewMessage>) {
    loop {
        let request = {
            let (slot, condvar) = &*request_slot;
            let mut pending = slot.lock().unwrap();
            while pending.is_none() {
                pending = condvar.wait(pending).unwrap();
            }
            pending.take().unwrap()
        };

        match request {
            PreviewRequest::Exit => return,
            PreviewRequest::SetDirectory(directory) => {
                scan_directory(&directory, &request_slot, &sender);
            }
        }
    }
}

fn has_pending_request(request_slot: &RequestSlot) -> bool {
    let (slot, _) = &**request_slot;
    slot.lock().unwrap().is_some()
}

fn scan_directory(directory: &std::path::Path, request_slot: &RequestSlot, sender: &SyncSender<PreviewMessage>) {
    //
    // Enumerate ship files first, so the owner can size its panel
    //

    let mut ship_files: Vec<PathBuf> = match std::fs::read_dir(directory) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("shp") | Some("yaml") | Some("yml")
                )
            })
            .collect(),
        Err(error) => {
            let _ = sender.send(PreviewMessage::DirScanError {
                message: format!("cannot scan {}: {}", directory.display(), error),
            });
            return;
        }
    };
    ship_files.sort();

    if send_best_effort(sender, PreviewMessage::DirScanCompleted { ship_files: ship_files.clone() }).is_err() {
        return;
    }

    //
    // Load previews one at a time, bailing out at the next file boundary
    // when a new request arrives
    //

    for (index, path) in ship_files.iter().enumerate() {
        if has_pending_request(request_slot) {
            tracing::debug!(directory = %directory.display(), "preview scan cancelled");
            return;
        }

        let message = match ShipDefinition::load(path) {
            Ok(definition) => PreviewMessage::PreviewReady {
                index,
                metadata: ShipPreviewMetadata {
                    path: path.clone(),
                    ship_name: definition.metadata.ship_name,
                    author: definition.metadata.author,
                },
            },
            Err(error) => PreviewMessage::PreviewError {
                index,
                message: error.to_string(),
            },
        };

        if send_best_effort(sender, message).is_err() {
            return;
        }
    }
}

/// Sends without ever blocking the scan behind a full queue: when the
/// queue is full, the message is dropped (the owner is far behind anyway
/// and will re-request). An error means the owner is gone.
fn send_best_effort(sender: &SyncSender<PreviewMessage>, message: PreviewMessage) -> Result<(), ()> {
    match sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Ok(()),
        Err(TrySendError::Disconnected(_)) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::{Duration, Instant};

    fn wait_for(scanner: &ShipPreviewScanner, mut accept: impl FnMut(&PreviewMessage) -> bool) -> PreviewMessage {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(message) = scanner.poll_message() {
                if accept(&message) {
                    return message;
                }
            } else {
                assert!(Instant::now() < deadline, "timed out waiting for preview message");
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    fn temp_ship_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sinkbox-preview-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scans_a_directory_and_reports_previews() {
        let dir = temp_ship_dir("scan");
        RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]))
            .save(dir.join("alpha_boat.png"))
            .unwrap();
        RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]))
            .save(dir.join("beta_boat.png"))
            .unwrap();

        let scanner = ShipPreviewScanner::new();
        scanner.set_directory(&dir);

        let completed = wait_for(&scanner, |m| matches!(m, PreviewMessage::DirScanCompleted { .. }));
        match completed {
            PreviewMessage::DirScanCompleted { ship_files } => assert_eq!(ship_files.len(), 2),
            _ => unreachable!(),
        }

        let ready = wait_for(&scanner, |m| matches!(m, PreviewMessage::PreviewReady { .. }));
        match ready {
            PreviewMessage::PreviewReady { index, metadata } => {
                assert_eq!(index, 0);
                assert_eq!(metadata.ship_name, "alpha boat");
            }
            _ => unreachable!(),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_reports_a_scan_error() {
        let scanner = ShipPreviewScanner::new();
        scanner.set_directory("/definitely/not/a/real/directory");

        let message = wait_for(&scanner, |m| matches!(m, PreviewMessage::DirScanError { .. }));
        assert!(matches!(message, PreviewMessage::DirScanError { .. }));
    }

    #[test]
    fn corrupt_ship_file_reports_a_preview_error() {
        let dir = temp_ship_dir("corrupt");
        std::fs::write(dir.join("broken.png"), b"not a png at all").unwrap();

        let scanner = ShipPreviewScanner::new();
        scanner.set_directory(&dir);

        let message = wait_for(&scanner, |m| matches!(m, PreviewMessage::PreviewError { .. }));
        assert!(matches!(message, PreviewMessage::PreviewError { index: 0, .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_exits_the_worker() {
        let scanner = ShipPreviewScanner::new();
        drop(scanner);
        // Join happened in Drop; nothing left running to assert against
    }
}
