use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};

use crate::{dictionary::Dictionary256, hashing::Keccak, scalar::Scalar};

pub(crate) type TestValue = Scalar<Vec<u8>>;
pub(crate) type TestDictionary = Dictionary256<TestValue, Keccak>;

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn value(bytes: &[u8]) -> TestValue {
    Scalar::new(bytes.to_vec())
}

/// Distinct, reproducible keys shaped like namespaced action keys.
pub(crate) fn random_keys(n: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let suffix: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(char::from)
                .collect();
            format!("account/{i}-{suffix}")
        })
        .collect()
}
