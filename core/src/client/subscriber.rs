use std::marker::PhantomData;

use tracing::warn;

use crate::codec::CodecError;
use crate::message_serializer::{LcmDecode, decode_from_slice};
use crate::routing::MessageHandler;

/// Decoded message handed to a typed callback.
pub type IncomingMessage<T> = Result<T, CodecError>;

/// Handler that decodes each payload as `T` before calling `callback`.
///
/// Created by [`Lcm::subscribe_typed`](super::Lcm::subscribe_typed).
/// Payloads that fail to decode are logged and still passed on as `Err`.
pub struct TypedHandler<T, F> {
	callback: F,
	_phantom: PhantomData<fn() -> T>,
}

impl<T, F> TypedHandler<T, F>
where
	T: LcmDecode + 'static,
	F: Fn(&str, IncomingMessage<T>) + Send + Sync + 'static,
{
	pub fn new(callback: F) -> Self {
		Self {
			callback,
			_phantom: PhantomData,
		}
	}
}

impl<T, F> MessageHandler for TypedHandler<T, F>
where
	T: LcmDecode + 'static,
	F: Fn(&str, IncomingMessage<T>) + Send + Sync + 'static,
{
	fn message_received(&self, channel: &str, data: &[u8]) {
		let message = decode_from_slice::<T>(data);
		if let Err(err) = &message {
			warn!(
				channel = %channel,
				payload_size = data.len(),
				error = ?err,
				"Failed to decode LCM message payload"
			);
		}
		(self.callback)(channel, message);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use super::*;
	use crate::message_serializer::encode_to_vec;

	#[test]
	fn test_decodes_before_callback() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let handler = TypedHandler::new(move |channel: &str, value: IncomingMessage<i32>| {
			sink.lock().unwrap().push((channel.to_string(), value));
		});

		handler.message_received("COUNT", &encode_to_vec(&42i32).unwrap());
		handler.message_received("COUNT", &[0, 1]);

		let seen = seen.lock().unwrap();
		assert_eq!(seen[0], ("COUNT".to_string(), Ok(42)));
		assert_eq!(
			seen[1],
			("COUNT".to_string(), Err(CodecError::insufficient_data(4, 2)))
		);
	}
}
