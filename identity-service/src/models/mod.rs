pub mod permittable_group;
pub mod role;
pub mod signature;
pub mod tenant;
pub mod user;

pub use permittable_group::{Permittable, PermittableGroupEntity};
pub use role::{AllowedOperation, PermissionType, RoleEntity};
pub use signature::{ApplicationSignatureSet, Signature, SignatureEntity, KEY_TIMESTAMP_FORMAT};
pub use tenant::{TenantEntity, TenantIdentifier};
pub use user::UserEntity;
