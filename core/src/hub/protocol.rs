//! Wire protocol shared by the hub relay and the `tcpq` client.
//!
//! After connecting, each side sends `magic | version` (the server first).
//! Every following frame starts with a 4-byte message type:
//!
//! - `PUBLISH`: `type | channel_len | channel | data_len | data`
//! - `SUBSCRIBE`, `UNSUBSCRIBE`: `type | pattern_len | pattern`
//!
//! All integers are big-endian.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// First word sent by the relay
pub const MAGIC_SERVER: u32 = 0x2876_17fa;
/// First word sent by a client
pub const MAGIC_CLIENT: u32 = 0x2876_17fb;
/// Protocol version sent after the magic
pub const VERSION: u32 = 0x0100;

/// Longest channel or pattern accepted in a frame
pub const MAX_CHANNEL_LEN: usize = 64 * 1024;
/// Largest payload accepted in a `PUBLISH` frame
pub const MAX_DATA_LEN: usize = 256 * 1024 * 1024;

/// Errors on a hub connection. All of them end the connection.
#[derive(Debug, Error)]
pub enum HubError {
	/// Socket failure, including the peer closing the connection
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The peer's greeting does not start with the expected magic
	#[error("Bad magic: expected 0x{expected:08x}, got 0x{actual:08x}")]
	BadMagic {
		/// Magic this side expects from the peer
		expected: u32,
		/// Magic the peer sent
		actual: u32,
	},

	/// A declared length is negative or over the frame limits
	#[error("Invalid {field} length {length}")]
	FrameTooLarge {
		/// Which length field
		field: &'static str,
		/// The declared length
		length: i64,
	},

	/// The frame type is not one of PUBLISH, SUBSCRIBE, UNSUBSCRIBE
	#[error("Unknown message type {0}")]
	UnknownMessageType(u32),

	/// The peer did not complete the greeting exchange in time
	#[error("Handshake timed out after {0:?}")]
	HandshakeTimeout(std::time::Duration),
}

impl HubError {
	/// Whether the error is the peer closing the connection.
	pub fn is_disconnect(&self) -> bool {
		matches!(self, Self::Io(err) if matches!(
			err.kind(),
			std::io::ErrorKind::UnexpectedEof
				| std::io::ErrorKind::ConnectionReset
				| std::io::ErrorKind::BrokenPipe
		))
	}
}

/// Frame type word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
	Publish = 1,
	Subscribe = 2,
	Unsubscribe = 3,
}

impl TryFrom<u32> for MessageType {
	type Error = HubError;

	fn try_from(value: u32) -> Result<Self, Self::Error> {
		match value {
			| 1 => Ok(Self::Publish),
			| 2 => Ok(Self::Subscribe),
			| 3 => Ok(Self::Unsubscribe),
			| other => Err(HubError::UnknownMessageType(other)),
		}
	}
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Publish { channel: String, data: Bytes },
	Subscribe(String),
	Unsubscribe(String),
}

impl Frame {
	/// Wire form of this frame.
	pub fn encode(&self) -> Bytes {
		match self {
			| Self::Publish { channel, data } => encode_publish(channel, data),
			| Self::Subscribe(pattern) => {
				encode_pattern(MessageType::Subscribe, pattern)
			}
			| Self::Unsubscribe(pattern) => {
				encode_pattern(MessageType::Unsubscribe, pattern)
			}
		}
	}

	/// Reads exactly one frame.
	pub async fn read<R>(reader: &mut R) -> Result<Self, HubError>
	where R: AsyncRead + Unpin {
		let message_type = MessageType::try_from(reader.read_u32().await?)?;
		match message_type {
			| MessageType::Publish => {
				let channel =
					read_string(reader, "channel", MAX_CHANNEL_LEN).await?;
				let data = read_block(reader, "data", MAX_DATA_LEN).await?;
				Ok(Self::Publish {
					channel,
					data: Bytes::from(data),
				})
			}
			| MessageType::Subscribe => Ok(Self::Subscribe(
				read_string(reader, "pattern", MAX_CHANNEL_LEN).await?,
			)),
			| MessageType::Unsubscribe => Ok(Self::Unsubscribe(
				read_string(reader, "pattern", MAX_CHANNEL_LEN).await?,
			)),
		}
	}
}

/// Encodes a `PUBLISH` frame without building a [`Frame`].
pub fn encode_publish(channel: &str, data: &[u8]) -> Bytes {
	let mut buf = BytesMut::with_capacity(12 + channel.len() + data.len());
	buf.put_u32(MessageType::Publish as u32);
	buf.put_u32(channel.len() as u32);
	buf.put_slice(channel.as_bytes());
	buf.put_u32(data.len() as u32);
	buf.put_slice(data);
	buf.freeze()
}

/// Encodes a `SUBSCRIBE` or `UNSUBSCRIBE` frame.
pub fn encode_pattern(message_type: MessageType, pattern: &str) -> Bytes {
	let mut buf = BytesMut::with_capacity(8 + pattern.len());
	buf.put_u32(message_type as u32);
	buf.put_u32(pattern.len() as u32);
	buf.put_slice(pattern.as_bytes());
	buf.freeze()
}

async fn read_length<R>(
	reader: &mut R,
	field: &'static str,
	limit: usize,
) -> Result<usize, HubError>
where
	R: AsyncRead + Unpin,
{
	let length = reader.read_i32().await?;
	usize::try_from(length)
		.ok()
		.filter(|length| *length <= limit)
		.ok_or(HubError::FrameTooLarge {
			field,
			length: length.into(),
		})
}

async fn read_block<R>(
	reader: &mut R,
	field: &'static str,
	limit: usize,
) -> Result<Vec<u8>, HubError>
where
	R: AsyncRead + Unpin,
{
	let length = read_length(reader, field, limit).await?;
	let mut block = vec![0u8; length];
	reader.read_exact(&mut block).await?;
	Ok(block)
}

async fn read_string<R>(
	reader: &mut R,
	field: &'static str,
	limit: usize,
) -> Result<String, HubError>
where
	R: AsyncRead + Unpin,
{
	let block = read_block(reader, field, limit).await?;
	Ok(String::from_utf8(block)
		.unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Writes `magic | version`.
pub async fn write_greeting<W>(writer: &mut W, magic: u32) -> Result<(), HubError>
where W: AsyncWrite + Unpin {
	let mut greeting = [0u8; 8];
	greeting[.. 4].copy_from_slice(&magic.to_be_bytes());
	greeting[4 ..].copy_from_slice(&VERSION.to_be_bytes());
	writer.write_all(&greeting).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads the peer's `magic | version` and returns the version.
pub async fn read_greeting<R>(
	reader: &mut R,
	expected_magic: u32,
) -> Result<u32, HubError>
where
	R: AsyncRead + Unpin,
{
	let magic = reader.read_u32().await?;
	if magic != expected_magic {
		return Err(HubError::BadMagic {
			expected: expected_magic,
			actual: magic,
		});
	}
	Ok(reader.read_u32().await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_frames_read_back() {
		let frames = [
			Frame::Publish {
				channel: "TEMPERATURE".to_string(),
				data: Bytes::from_static(b"\x01\x02\x03"),
			},
			Frame::Subscribe("TEMP.*".to_string()),
			Frame::Unsubscribe("TEMP.*".to_string()),
			Frame::Publish {
				channel: String::new(),
				data: Bytes::new(),
			},
		];
		let mut wire = Vec::new();
		for frame in &frames {
			wire.extend_from_slice(&frame.encode());
		}
		let mut reader = wire.as_slice();
		for frame in &frames {
			assert_eq!(&Frame::read(&mut reader).await.unwrap(), frame);
		}
		assert!(Frame::read(&mut reader).await.unwrap_err().is_disconnect());
	}

	#[test]
	fn test_publish_layout() {
		let wire = encode_publish("AB", b"xyz");
		assert_eq!(
			&wire[..],
			b"\0\0\0\x01\0\0\0\x02AB\0\0\0\x03xyz".as_slice()
		);
	}

	#[tokio::test]
	async fn test_negative_and_oversized_lengths() {
		let wire = [0u8, 0, 0, 1, 0xff, 0xff, 0xff, 0xff];
		assert!(matches!(
			Frame::read(&mut wire.as_slice()).await,
			Err(HubError::FrameTooLarge {
				field: "channel",
				length: -1
			})
		));

		let mut wire = encode_pattern(MessageType::Subscribe, "").to_vec();
		wire[4 .. 8].copy_from_slice(&((MAX_CHANNEL_LEN + 1) as u32).to_be_bytes());
		assert!(matches!(
			Frame::read(&mut wire.as_slice()).await,
			Err(HubError::FrameTooLarge { field: "pattern", .. })
		));
	}

	#[tokio::test]
	async fn test_unknown_type() {
		let wire = 9u32.to_be_bytes();
		assert!(matches!(
			Frame::read(&mut wire.as_slice()).await,
			Err(HubError::UnknownMessageType(9))
		));
	}

	#[tokio::test]
	async fn test_greeting() {
		let mut wire = Vec::new();
		write_greeting(&mut wire, MAGIC_SERVER).await.unwrap();
		assert_eq!(wire, [0x28u8, 0x76, 0x17, 0xfa, 0, 0, 1, 0]);
		assert_eq!(
			read_greeting(&mut wire.as_slice(), MAGIC_SERVER).await.unwrap(),
			VERSION
		);
		assert!(matches!(
			read_greeting(&mut wire.as_slice(), MAGIC_CLIENT).await,
			Err(HubError::BadMagic {
				expected: MAGIC_CLIENT,
				actual: MAGIC_SERVER
			})
		));
	}
}
