//! Session authentication core: credentials, sessions, expiry and role management.
//! Keep the public surface thin and split implementation across sub-modules.

mod accounts;
mod authenticator;
mod credentials;
mod guard;
mod hasher;
#[cfg(feature = "postgres")]
mod postgres;
mod provider;
mod repository;
mod roles;
mod session;
mod steps;
mod sweeper;
mod validator;

pub use accounts::{MemoryAccountProvider, ProfileAccount};
pub use authenticator::{Authenticator, AuthenticatorBuilder};
pub use credentials::{Account, AdminIdentity, AdminSecret, BasicAccount, Credentials, SharedAccount};
pub use guard::Guard;
pub use hasher::Argon2Hasher;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCredentialRepository;
pub use provider::{AccountProvider, CredentialRepository, CredentialValidator, PasswordHasher};
pub use repository::MemoryCredentialRepository;
pub use roles::diff_roles;
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use steps::StepGate;
pub use sweeper::{sweep_expired, ExpirySweeper};
pub use validator::DefaultValidator;
