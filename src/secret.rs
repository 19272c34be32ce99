//! Cluster secret generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

const SECRET_LENGTH: usize = 20;

/// Generate the shared secret workers use to authenticate with a server.
pub fn generate_cluster_secret() -> String {
    random_string(SECRET_LENGTH)
}

/// Random alphanumeric string of the given length.
pub fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
