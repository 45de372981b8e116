//! Mapper contracts.

use std::fmt::Debug;

use kc_model::{ExternalIdentity, LocalUserSnapshot};
use kc_spi::ProviderFactory;
use uuid::Uuid;

use crate::config::{MapperConfig, SyncMode};
use crate::descriptor::MapperDescriptor;
use crate::error::{ConfigError, MapperResult};
use crate::mutation::MutationSet;

/// What a mapper sees for one login.
#[derive(Debug, Clone, Copy)]
pub struct MapperContext<'a> {
    /// Identity asserted by the provider.
    pub identity: &'a ExternalIdentity,
    /// User before this login's mutations.
    pub user: &'a LocalUserSnapshot,
    /// Realm of the broker link.
    pub realm_id: Uuid,
    /// Provider alias of the broker link.
    pub provider_alias: &'a str,
    /// Sync mode of the broker link.
    pub sync_mode: SyncMode,
}

/// A mapper bound to one stored configuration.
///
/// Mappers are pure: they read the context and return mutations. They never
/// perform I/O and never mutate the user.
pub trait Mapper: Send + Sync + Debug {
    /// Computes mutations for a user imported on this login.
    ///
    /// ## Errors
    ///
    /// Returns an error if a value the mapper needs cannot be computed.
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> MapperResult<MutationSet>;

    /// Computes mutations for an existing user.
    ///
    /// `previous` holds the mutations of mappers with lower ordinals.
    ///
    /// ## Errors
    ///
    /// Returns an error if a value the mapper needs cannot be computed.
    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        previous: &MutationSet,
    ) -> MapperResult<MutationSet>;
}

/// Factory for one mapper type.
///
/// The factory's [`ProviderFactory::id`] is the mapper type id.
pub trait MapperFactory: ProviderFactory {
    /// Describes the configuration this mapper type accepts.
    ///
    /// Callable before `init`.
    fn describe(&self) -> MapperDescriptor;

    /// Creates a mapper from a stored configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError>;
}
