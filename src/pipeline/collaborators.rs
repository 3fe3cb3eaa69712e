//! Contracts the pipeline uses to talk to the consumer side.
//!
//! Both traits are only ever called from the consumer context, so neither
//! needs to be `Send`.

use crate::error::PipelineError;
use crate::images::PixelBuffer;
use crate::models::{ImageSource, RequestIdentity, Status};

/// Owner of graphics resources (textures) on the consumer context.
pub trait ResourceManager {
    /// Handle to a live graphics resource
    type Resource;

    /// Return a resource that already exists for `identity`, if any.
    fn lookup_existing(&self, identity: &RequestIdentity) -> Option<Self::Resource>;

    /// Build a resource from decoded pixels.
    fn create(
        &mut self,
        pixels: PixelBuffer,
        identity: &RequestIdentity,
    ) -> anyhow::Result<Self::Resource>;
}

/// A view waiting for an image.
///
/// Callbacks must be cheap; they run on the consumer context between frames.
pub trait Requester<R> {
    /// What the requester wants to show right now, if anything.
    ///
    /// Notifications for tasks whose source no longer matches are dropped.
    fn desired(&self) -> Option<ImageSource>;

    /// The task serving this requester changed state.
    fn on_status(&self, status: Status);

    /// The requested image is ready.
    fn on_resource_ready(&self, resource: R);

    /// Details for the `DOWNLOAD_FAILED` status that was just delivered.
    fn on_failure(&self, _error: &PipelineError) {}
}
