//! Authentication: identities, secrets and bearer tokens

pub mod credentials;
pub mod identity_store;
pub mod password;
pub mod token_store;
pub mod tokens;

pub use credentials::{CredentialStore, NewIdentity};
pub use identity_store::{IdentityStore, InMemoryIdentityStore};
pub use password::SecretHasher;
pub use token_store::{InMemoryTokenStore, IssuedToken, TokenStore};
pub use tokens::{Claims, TokenKind, TokenPair, TokenService};
