use std::fmt;
use uuid::Uuid;

/// Generates a newtype wrapper around `Uuid` so entity identifiers can't be
/// accidentally swapped across tables at compile time (e.g. a `ProductId`
/// passed where a `TenantId` is expected).
macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_newtype!(TenantId);
id_newtype!(ProductId);
id_newtype!(CampaignVariantId);
id_newtype!(DocumentSourceId);
id_newtype!(SpecCategoryId);
id_newtype!(SpecItemId);
id_newtype!(SpecValueId);
id_newtype!(FeatureBlockId);
id_newtype!(KnowledgeChunkId);
id_newtype!(ComparisonRowId);
id_newtype!(IngestionJobId);
id_newtype!(LineageEventId);
id_newtype!(DriftAlertId);

/// Every tenant-scoped query carries this marker so repository methods
/// can't be called without an explicit tenant filter (invariant I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope(pub TenantId);

impl TenantScope {
    pub fn id(&self) -> TenantId {
        self.0
    }
}
