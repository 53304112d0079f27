use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arcstr::ArcStr;
use futures::future::join_all;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::config::LcmConfig;
use super::error::LcmError;
use super::publisher::LcmPublisher;
use super::subscriber::{IncomingMessage, TypedHandler};
use crate::message_serializer::{LcmDecode, LcmEncode, encode_to_vec};
use crate::provider::{Provider, ProviderError, create_provider};
use crate::routing::{SharedHandler, SubscriptionId, SubscriptionManager};
use crate::topic::ChannelPattern;
use crate::url_parser::UrlParser;

struct LcmInner {
	providers: Vec<Box<dyn Provider>>,
	dispatcher: Arc<SubscriptionManager>,
	/// Serializes fan-out so one caller's message reaches every provider
	/// before the next caller's
	publish_lock: AsyncMutex<()>,
	closed: AtomicBool,
}

/// Publish/subscribe message bus over one or more transports.
///
/// Every publish goes to all providers; every message any provider
/// receives is dispatched to the matching subscriptions. Cloning is cheap
/// and clones share the same bus.
///
/// Call [`close`](Self::close) when done. After it returns no handler runs
/// again and every operation fails with [`LcmError::Closed`].
#[derive(Clone)]
pub struct Lcm {
	inner: Arc<LcmInner>,
}

impl Lcm {
	/// Connects to the given provider URLs with default settings.
	///
	/// An empty slice uses `LCM_DEFAULT_URL`, or the local multicast group
	/// when that is unset.
	pub async fn connect(urls: &[&str]) -> Result<Self, LcmError> {
		Self::connect_with_config(LcmConfig::new(urls.iter().copied())).await
	}

	/// Connects with explicit configuration.
	///
	/// A URL that fails to parse or whose provider cannot be created is
	/// logged and skipped; construction fails only when no provider at all
	/// could be created.
	pub async fn connect_with_config(config: LcmConfig) -> Result<Self, LcmError> {
		let config = if config.urls.is_empty() {
			LcmConfig::from_env().with_settings(config.settings)
		} else {
			config
		};
		let dispatcher =
			Arc::new(SubscriptionManager::new(config.settings.cache_strategy()?));

		let mut providers = Vec::with_capacity(config.urls.len());
		let mut first_error = None;
		for url in &config.urls {
			match Self::open_provider(url, &dispatcher, &config).await {
				| Ok(Some(provider)) => {
					info!(url = %url, provider = provider.name(), "LCM provider ready");
					providers.push(provider);
				}
				| Ok(None) => {}
				| Err(err) => {
					error!(url = %url, error = %err, "Failed to create LCM provider");
					first_error.get_or_insert(err);
				}
			}
		}

		if providers.is_empty() {
			return Err(first_error.unwrap_or(LcmError::NoProviders {
				urls: config.urls,
			}));
		}
		Ok(Self {
			inner: Arc::new(LcmInner {
				providers,
				dispatcher,
				publish_lock: AsyncMutex::new(()),
				closed: AtomicBool::new(false),
			}),
		})
	}

	async fn open_provider(
		url: &str,
		dispatcher: &Arc<SubscriptionManager>,
		config: &LcmConfig,
	) -> Result<Option<Box<dyn Provider>>, LcmError> {
		let url = UrlParser::parse(url)?;
		Ok(create_provider(&url, Arc::clone(dispatcher), &config.settings).await?)
	}

	fn ensure_open(&self) -> Result<(), LcmError> {
		if self.inner.closed.load(Ordering::Acquire) {
			return Err(LcmError::Closed);
		}
		Ok(())
	}

	/// Names of the active providers, in URL order.
	pub fn provider_names(&self) -> Vec<&'static str> {
		self.inner.providers.iter().map(|p| p.name()).collect()
	}

	/// Publishes raw bytes on `channel` through every provider.
	///
	/// Transport failures are logged and do not stop delivery to the other
	/// providers. A message too large to fragment is returned as an error.
	pub async fn publish(&self, channel: &str, data: &[u8]) -> Result<(), LcmError> {
		self.ensure_open()?;
		let _fan_out = self.inner.publish_lock.lock().await;
		let mut rejected = None;
		for provider in &self.inner.providers {
			match provider.publish(channel, data).await {
				| Ok(()) => {}
				| Err(err @ ProviderError::MessageTooLarge { .. })
				| Err(err @ ProviderError::InvalidChannel { .. }) => {
					rejected.get_or_insert(err);
				}
				| Err(err) => {
					error!(
						provider = provider.name(),
						channel = %channel,
						error = %err,
						"Publish failed"
					);
				}
			}
		}
		match rejected {
			| Some(err) => Err(err.into()),
			| None => Ok(()),
		}
	}

	/// Publishes the bytes of `text` followed by a NUL terminator.
	pub async fn publish_str(&self, channel: &str, text: &str) -> Result<(), LcmError> {
		let mut data = Vec::with_capacity(text.len() + 1);
		data.extend_from_slice(text.as_bytes());
		data.push(0);
		self.publish(channel, &data).await
	}

	/// Encodes `message` and publishes it.
	pub async fn publish_encoded<T>(
		&self,
		channel: &str,
		message: &T,
	) -> Result<(), LcmError>
	where
		T: LcmEncode + ?Sized,
	{
		self.ensure_open()?;
		let data = encode_to_vec(message)?;
		self.publish(channel, &data).await
	}

	/// Typed publisher bound to `channel`.
	pub fn publisher<T>(
		&self,
		channel: impl Into<ArcStr>,
	) -> Result<LcmPublisher<T>, LcmError>
	where
		T: LcmEncode,
	{
		self.ensure_open()?;
		let channel = channel.into();
		if channel.contains('\0') {
			return Err(ProviderError::invalid_channel(
				channel.as_str(),
				"channel contains a NUL byte",
			)
			.into());
		}
		Ok(LcmPublisher::new(self.clone(), channel))
	}

	/// Registers `handler` for every channel fully matching the regular
	/// expression `pattern`.
	///
	/// The handler runs on the receiving provider's task, in registration
	/// order with the other matching handlers. It must not call back into
	/// subscribe, unsubscribe or close on this bus.
	pub async fn subscribe(
		&self,
		pattern: &str,
		handler: SharedHandler,
	) -> Result<SubscriptionId, LcmError> {
		self.ensure_open()?;
		let pattern = ChannelPattern::new(pattern)?;
		let id = self.inner.dispatcher.subscribe(pattern.clone(), handler)?;
		for provider in &self.inner.providers {
			if let Err(err) = provider.subscribe(pattern.as_str()).await {
				warn!(
					provider = provider.name(),
					pattern = %pattern,
					error = %err,
					"Provider subscribe failed"
				);
			}
		}
		Ok(id)
	}

	/// [`subscribe`](Self::subscribe) with a closure.
	pub async fn subscribe_fn<F>(
		&self,
		pattern: &str,
		callback: F,
	) -> Result<SubscriptionId, LcmError>
	where
		F: Fn(&str, &[u8]) + Send + Sync + 'static,
	{
		self.subscribe(pattern, Arc::new(callback)).await
	}

	/// Registers `handler` for every channel.
	pub async fn subscribe_all(
		&self,
		handler: SharedHandler,
	) -> Result<SubscriptionId, LcmError> {
		self.subscribe(ChannelPattern::MATCH_ALL, handler).await
	}

	/// Registers a callback that receives payloads decoded as `T`.
	pub async fn subscribe_typed<T, F>(
		&self,
		pattern: &str,
		callback: F,
	) -> Result<SubscriptionId, LcmError>
	where
		T: LcmDecode + 'static,
		F: Fn(&str, IncomingMessage<T>) + Send + Sync + 'static,
	{
		self.subscribe(pattern, Arc::new(TypedHandler::new(callback)))
			.await
	}

	/// Removes subscriptions by pattern text and/or handler identity.
	///
	/// `pattern: None` removes every subscription of `handler`,
	/// `handler: None` every subscription with that pattern, and both
	/// `None` everything. Returns how many were removed.
	pub async fn unsubscribe(
		&self,
		pattern: Option<&str>,
		handler: Option<&SharedHandler>,
	) -> Result<usize, LcmError> {
		self.ensure_open()?;
		let removed = self.inner.dispatcher.unsubscribe(pattern, handler)?;
		for record in &removed {
			self.unsubscribe_providers(record.pattern()).await;
		}
		Ok(removed.len())
	}

	/// Removes one subscription. Returns whether it was still registered.
	pub async fn unsubscribe_id(&self, id: SubscriptionId) -> Result<bool, LcmError> {
		self.ensure_open()?;
		match self.inner.dispatcher.unsubscribe_id(id)? {
			| Some(record) => {
				self.unsubscribe_providers(record.pattern()).await;
				Ok(true)
			}
			| None => Ok(false),
		}
	}

	async fn unsubscribe_providers(&self, pattern: &ChannelPattern) {
		for provider in &self.inner.providers {
			if let Err(err) = provider.unsubscribe(pattern.as_str()).await {
				warn!(
					provider = provider.name(),
					pattern = %pattern,
					error = %err,
					"Provider unsubscribe failed"
				);
			}
		}
	}

	/// Number of registered subscriptions.
	pub fn num_subscriptions(&self) -> Result<usize, LcmError> {
		self.ensure_open()?;
		Ok(self.inner.dispatcher.len()?)
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Stops every provider and drops all subscriptions.
	///
	/// Returns once all receive tasks have ended; no handler is called
	/// afterwards. Closing twice fails with [`LcmError::Closed`].
	pub async fn close(&self) -> Result<(), LcmError> {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return Err(LcmError::Closed);
		}
		// waits for an in-flight dispatch, then drops everything received
		self.inner.dispatcher.close();
		join_all(self.inner.providers.iter().map(|provider| async move {
			provider.close().await;
			debug!(provider = provider.name(), "LCM provider closed");
		}))
		.await;
		info!("LCM bus closed");
		Ok(())
	}
}

impl std::fmt::Debug for Lcm {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Lcm")
			.field("providers", &self.provider_names())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl Drop for LcmInner {
	fn drop(&mut self) {
		if !self.closed.load(Ordering::Acquire) {
			error!(
				"Lcm dropped without calling close(). Please call close() and \
				 await its completion before dropping."
			);
			// receive tasks stop once their shutdown senders are dropped
			self.dispatcher.close();
		}
	}
}
