// Copyright 2020 The Halley Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The disk worker: a dedicated thread that owns all block-file writes and
//! index-database commits so the network loop never blocks on storage.
//! Tasks carry everything they need and are executed strictly in
//! submission order.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use crate::store::{ChainStore, IndexFlushData};

/// One unit of storage work posted from the main loop.
pub enum DiskTask {
	/// Append a block record (magic, size, bytes) at a pre-assigned
	/// position of a block file.
	WriteBlock {
		/// The blk file to write into
		path: PathBuf,
		/// Byte offset of the record
		position: u32,
		/// Network magic prefixed to the record
		magic: u32,
		/// Serialized block
		bytes: Vec<u8>,
	},
	/// Commit one batch of index records.
	FlushIndex(IndexFlushData),
}

/// Handle to the disk worker thread. Dropping it drains and joins.
pub struct DiskWorker {
	sender: Option<mpsc::Sender<DiskTask>>,
	handle: Option<thread::JoinHandle<()>>,
}

impl DiskWorker {
	/// Spawn the worker. The chain store handle is the worker's alone to
	/// commit with; the main loop only prepares the record batches.
	pub fn start(store: ChainStore) -> DiskWorker {
		let (sender, receiver) = mpsc::channel::<DiskTask>();
		let handle = thread::Builder::new()
			.name("disk".to_string())
			.spawn(move || {
				while let Ok(task) = receiver.recv() {
					run_task(&store, task);
				}
				debug!("disk: worker drained, exiting");
			})
			.expect("spawn disk worker");
		DiskWorker {
			sender: Some(sender),
			handle: Some(handle),
		}
	}

	/// Queue a task. Failures of the task itself are logged by the worker;
	/// a send failure means the worker died and is logged here.
	pub fn post(&self, task: DiskTask) {
		if let Some(sender) = &self.sender {
			if sender.send(task).is_err() {
				error!("disk: worker unavailable, dropping task");
			}
		}
	}
}

impl Drop for DiskWorker {
	fn drop(&mut self) {
		// closing the channel lets the worker drain pending writes
		self.sender.take();
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}

fn run_task(store: &ChainStore, task: DiskTask) {
	match task {
		DiskTask::WriteBlock {
			path,
			position,
			magic,
			bytes,
		} => {
			if let Err(e) = write_block_record(&path, position, magic, &bytes) {
				error!("disk: failed to write block at {:?}:{}: {}", path, position, e);
			}
		}
		DiskTask::FlushIndex(data) => {
			let records = data.blocks.len();
			if let Err(e) = store.write_flush(&data) {
				error!("disk: failed to flush {} index records: {}", records, e);
			} else {
				debug!("disk: flushed {} index records", records);
			}
		}
	}
}

fn write_block_record(
	path: &PathBuf,
	position: u32,
	magic: u32,
	bytes: &[u8],
) -> std::io::Result<()> {
	let mut file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.open(path)?;
	file.seek(SeekFrom::Start(position as u64))?;
	file.write_all(&magic.to_le_bytes())?;
	file.write_all(&(bytes.len() as u32).to_le_bytes())?;
	file.write_all(bytes)?;
	file.flush()?;
	trace!("disk: wrote {} bytes at {:?}:{}", bytes.len() + 8, path, position);
	Ok(())
}
