//! Shared fixtures for unit tests. RSA key generation is slow, so each named
//! identity is generated once per test binary and handed out in a fresh slot.

use std::sync::OnceLock;

use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;

use crate::wrap::PrivateKeyHandle;

static ALICE: OnceLock<RsaPrivateKey> = OnceLock::new();
static BOB: OnceLock<RsaPrivateKey> = OnceLock::new();

fn handle(cell: &OnceLock<RsaPrivateKey>) -> PrivateKeyHandle {
    let key = cell
        .get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
        .clone();
    PrivateKeyHandle::new(key).unwrap()
}

pub(crate) fn alice() -> PrivateKeyHandle {
    handle(&ALICE)
}

pub(crate) fn bob() -> PrivateKeyHandle {
    handle(&BOB)
}
