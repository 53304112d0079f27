//! UDP datagram framing for the `udpm` transport.
//!
//! Short messages travel in one datagram:
//! `magic | seq | channel\0 | payload`.
//!
//! Larger ones are split into fragments, each
//! `magic | seq | total_size | offset | index | count | bytes`, where
//! fragment 0 carries `channel\0` in front of its bytes. All integers are
//! big-endian.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

use super::error::ProviderError;
use crate::codec::{CodecError, LcmDataInput, LcmDataOutput};

/// First word of a single-datagram message ("LC02")
pub const MAGIC_SHORT: u32 = 0x4c43_3032;
/// First word of every fragment of a fragmented message ("LC03")
pub const MAGIC_LONG: u32 = 0x4c43_3033;
/// Largest `channel + payload` (short) or fragment body (long) in bytes
pub const FRAGMENTATION_THRESHOLD: usize = 64_000;
/// The fragment count is a 16-bit field
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

const SHORT_HEADER_SIZE: usize = 8;
const LONG_HEADER_SIZE: usize = 20;

/// Malformed or inconsistent inbound datagram
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatagramError {
	/// The first word is neither magic
	#[error("Bad magic 0x{0:08x}")]
	BadMagic(u32),

	/// The datagram is truncated or its channel is not valid text
	#[error("Malformed datagram: {0}")]
	Malformed(#[from] CodecError),

	/// The fragment does not fit the message it claims to belong to
	#[error("Invalid fragment {index}/{count} at offset {offset}: {reason}")]
	InvalidFragment {
		/// Fragment index
		index: u16,
		/// Fragment count declared by the sender
		count: u16,
		/// Byte offset of the fragment data
		offset: u32,
		/// What is inconsistent
		reason: &'static str,
	},
}

/// Splits one message into the datagrams that carry it.
///
/// Fails when the channel contains NUL or does not fit in a datagram, or
/// when the payload needs more than [`MAX_FRAGMENTS`] fragments.
pub fn encode_message(
	seq: u32,
	channel: &str,
	data: &[u8],
) -> Result<Vec<Bytes>, ProviderError> {
	if channel.as_bytes().contains(&0) {
		return Err(ProviderError::invalid_channel(channel, "contains NUL"));
	}
	let channel_len = channel.len();
	if channel_len + 1 >= FRAGMENTATION_THRESHOLD {
		return Err(ProviderError::invalid_channel(
			channel,
			"longer than a datagram",
		));
	}

	if channel_len + data.len() <= FRAGMENTATION_THRESHOLD {
		let mut out = LcmDataOutput::with_capacity(
			SHORT_HEADER_SIZE + channel_len + 1 + data.len(),
		);
		out.write_u32(MAGIC_SHORT);
		out.write_u32(seq);
		out.write_bytes(channel.as_bytes());
		out.write_u8(0);
		out.write_bytes(data);
		return Ok(vec![out.to_bytes()]);
	}

	let first_size = FRAGMENTATION_THRESHOLD - (channel_len + 1);
	let fragments = check_fragment_limit(channel_len, data.len())?;

	let total_size = data.len() as u32;
	let mut datagrams = Vec::with_capacity(fragments);
	let mut out = LcmDataOutput::with_capacity(
		LONG_HEADER_SIZE + FRAGMENTATION_THRESHOLD,
	);
	let mut offset = 0usize;
	for index in 0 .. fragments {
		let body = if index == 0 { first_size } else { FRAGMENTATION_THRESHOLD };
		let end = (offset + body).min(data.len());

		out.reset();
		out.write_u32(MAGIC_LONG);
		out.write_u32(seq);
		out.write_u32(total_size);
		out.write_u32(offset as u32);
		out.write_u16(index as u16);
		out.write_u16(fragments as u16);
		if index == 0 {
			out.write_bytes(channel.as_bytes());
			out.write_u8(0);
		}
		out.write_bytes(&data[offset .. end]);
		datagrams.push(out.to_bytes());
		offset = end;
	}
	Ok(datagrams)
}

/// Number of datagrams needed for a message with a channel of
/// `channel_len` bytes and a payload of `data_len` bytes.
pub fn fragment_count(channel_len: usize, data_len: usize) -> usize {
	if channel_len + data_len <= FRAGMENTATION_THRESHOLD {
		return 1;
	}
	let first_size = FRAGMENTATION_THRESHOLD.saturating_sub(channel_len + 1);
	1 + (data_len - first_size).div_ceil(FRAGMENTATION_THRESHOLD)
}

/// Fragment count for a fragmented message, or `MessageTooLarge` when the
/// count or the payload size does not fit its header field.
pub fn check_fragment_limit(
	channel_len: usize,
	data_len: usize,
) -> Result<usize, ProviderError> {
	let fragments = fragment_count(channel_len, data_len);
	if fragments > MAX_FRAGMENTS || data_len > u32::MAX as usize {
		return Err(ProviderError::MessageTooLarge {
			size: data_len,
			fragments,
		});
	}
	Ok(fragments)
}

/// In-flight fragmented message from one sender.
#[derive(Debug)]
struct FragmentBuffer {
	channel: String,
	seq: u32,
	data: Vec<u8>,
	received: Vec<bool>,
	remaining: usize,
}

/// Reassembles fragmented messages, one buffer per sender.
///
/// A fragment whose sequence number or total size disagrees with the
/// sender's buffer evicts it. Fragments arriving with no buffer and index
/// other than 0 are dropped. Duplicate fragments are ignored.
#[derive(Debug, Default)]
pub struct Reassembler {
	buffers: HashMap<SocketAddr, FragmentBuffer>,
}

impl Reassembler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of senders with a partially received message.
	pub fn pending(&self) -> usize {
		self.buffers.len()
	}

	/// Handles one datagram from `from`.
	///
	/// Returns the complete message when this datagram finishes one.
	pub fn handle_datagram<'a>(
		&mut self,
		from: SocketAddr,
		datagram: &'a [u8],
	) -> Result<Option<(String, Cow<'a, [u8]>)>, DatagramError> {
		let mut input = LcmDataInput::new(datagram);
		match input.read_u32()? {
			| MAGIC_SHORT => {
				let _seq = input.read_u32()?;
				let channel = input.read_string_z()?;
				Ok(Some((channel, Cow::Borrowed(input.remaining()))))
			}
			| MAGIC_LONG => self.handle_fragment(from, &mut input),
			| magic => Err(DatagramError::BadMagic(magic)),
		}
	}

	fn handle_fragment<'a>(
		&mut self,
		from: SocketAddr,
		input: &mut LcmDataInput<'a>,
	) -> Result<Option<(String, Cow<'a, [u8]>)>, DatagramError> {
		let seq = input.read_u32()?;
		let total_size = input.read_u32()?;
		let offset = input.read_u32()?;
		let index = input.read_u16()?;
		let count = input.read_u16()?;
		let invalid = |reason| DatagramError::InvalidFragment {
			index,
			count,
			offset,
			reason,
		};

		let channel = if index == 0 {
			Some(input.read_string_z()?)
		} else {
			None
		};
		let body = input.remaining();

		if self.buffers.get(&from).is_some_and(|buf| {
			buf.seq != seq || buf.data.len() != total_size as usize
		}) {
			self.buffers.remove(&from);
		}

		if !self.buffers.contains_key(&from) {
			let Some(channel) = channel else {
				// start of this message never seen
				return Ok(None);
			};
			if count == 0 || index >= count {
				return Err(invalid("index outside fragment count"));
			}
			if total_size as usize > count as usize * FRAGMENTATION_THRESHOLD {
				return Err(invalid("total size exceeds fragment capacity"));
			}
			self.buffers.insert(from, FragmentBuffer {
				channel,
				seq,
				data: vec![0; total_size as usize],
				received: vec![false; count as usize],
				remaining: count as usize,
			});
		}

		let Some(buf) = self.buffers.get_mut(&from) else {
			return Ok(None);
		};
		let start = offset as usize;
		let end = start + body.len();
		if index as usize >= buf.received.len() || end > buf.data.len() {
			self.buffers.remove(&from);
			return Err(invalid("fragment outside message bounds"));
		}

		if !buf.received[index as usize] {
			buf.received[index as usize] = true;
			buf.data[start .. end].copy_from_slice(body);
			buf.remaining -= 1;
		}

		if buf.remaining == 0 {
			if let Some(done) = self.buffers.remove(&from) {
				return Ok(Some((done.channel, Cow::Owned(done.data))));
			}
		}
		Ok(None)
	}
}
