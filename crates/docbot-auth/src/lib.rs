pub mod credentials;
pub mod sigv4;

pub use credentials::{mask_secret, AwsCredentials};
pub use sigv4::{RequestSigner, SigningProfile};
