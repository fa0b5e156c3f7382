//! Bridges durable broker subscriptions to synchronous function invocations.
//!
//! Each active trigger owns one durable subscription. Every delivered message
//! is handed to a [`Dispatcher`] which invokes the trigger's function with a
//! bounded number of attempts, acknowledges the message only on success, and
//! fans the result out to the trigger's response or error topic.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bridge;
mod dispatcher;
mod error;
mod invoker;
mod manager;
mod resolver;
mod subscription;
mod trigger;

pub use bridge::{Bridge, BridgeOptions, DEFAULT_ATTEMPT_TIMEOUT, max_dispatch_duration};
pub use dispatcher::{
    Dispatcher, ERROR_TOPIC_HEADER, InvocationOutcome, RESPONSE_TOPIC_HEADER, TOPIC_HEADER,
};
pub use error::{ConfigurationError, DispatchError, Error, Result};
pub use invoker::{
    HttpInvoker, InvocationRequest, InvocationResponse, InvokeError, Invoker, ResponseBody,
};
pub use manager::TriggerManager;
pub use resolver::{DEFAULT_FUNCTION_PATH_PREFIX, EndpointResolver, RouterResolver};
pub use subscription::Subscription;
pub use trigger::{
    DEFAULT_CONTENT_TYPE, FunctionReference, FunctionReferenceKind, MAX_RETRIES, MIN_RETRIES,
    TriggerSpec,
};
