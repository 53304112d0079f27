use std::marker::PhantomData;

use arcstr::ArcStr;

use super::async_client::Lcm;
use super::error::LcmError;
use crate::message_serializer::LcmEncode;

/// Typed publisher bound to one channel.
///
/// Created via [`Lcm::publisher`]. Cheap to clone; clones share the bus.
pub struct LcmPublisher<T> {
	lcm: Lcm,
	channel: ArcStr,
	_phantom: PhantomData<fn(&T)>,
}

impl<T> LcmPublisher<T>
where T: LcmEncode
{
	pub(crate) fn new(lcm: Lcm, channel: ArcStr) -> Self {
		Self {
			lcm,
			channel,
			_phantom: PhantomData,
		}
	}

	/// Channel this publisher writes to.
	pub fn channel(&self) -> &ArcStr {
		&self.channel
	}

	/// Encodes `message` and publishes it on the bound channel.
	pub async fn publish(&self, message: &T) -> Result<(), LcmError> {
		self.lcm.publish_encoded(&self.channel, message).await
	}
}

impl<T> Clone for LcmPublisher<T> {
	fn clone(&self) -> Self {
		Self {
			lcm: self.lcm.clone(),
			channel: self.channel.clone(),
			_phantom: PhantomData,
		}
	}
}

impl<T> std::fmt::Debug for LcmPublisher<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LcmPublisher")
			.field("channel", &self.channel)
			.finish_non_exhaustive()
	}
}
