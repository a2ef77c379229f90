use proptest::prelude::*;
use secrecy::SecretString;

use pqvault::{
    Aes256GcmCipher, Argon2idHasher, ChunkCipher, ContainerCodec, DecryptionEngine,
    EncryptionEngine, KdfParams, KeyEncapsulator, KeyPair, Kyber1024, PasswordKeyDeriver,
    PqVaultError, PrivateKeyVault, CHUNK_SIZE, HEADER_SIZE, NONCE_SIZE, TAG_SIZE,
};

struct Fixture {
    enc: EncryptionEngine,
    dec: DecryptionEngine,
    pair: KeyPair,
}

fn fixture() -> Fixture {
    let kem = Kyber1024::initialize().unwrap();
    let vault = PrivateKeyVault::new(
        PasswordKeyDeriver::new(Argon2idHasher::new(KdfParams::testing())),
        Aes256GcmCipher,
    );
    let enc = EncryptionEngine::new(kem);
    let dec = DecryptionEngine::with_parts(KeyEncapsulator::new(kem), vault, ChunkCipher::default());
    let pair = enc.encapsulator().generate_key_pair().unwrap();
    Fixture { enc, dec, pair }
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s)
}

/// Offset of chunk `index` when every earlier chunk is full.
fn chunk_offset(index: usize) -> usize {
    HEADER_SIZE + index * (NONCE_SIZE + 4 + CHUNK_SIZE + TAG_SIZE)
}

#[test]
fn concrete_scenario_password_rotation() {
    let f = fixture();
    let sealed = f.dec.vault().seal(&f.pair.private_key, &pw("p@ss1")).unwrap();

    let container = f.enc.encrypt_container(&[1, 2, 3, 4, 5], &f.pair.public_key).unwrap();
    assert_eq!(container.len(), HEADER_SIZE + 12 + 4 + (5 + TAG_SIZE));
    assert_eq!(container.len(), 10240 + 12 + 4 + 21);
    let snapshot = container.clone();

    assert_eq!(
        f.dec.decrypt_container(&container, &pw("p@ss1"), &sealed).unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert!(matches!(
        f.dec.decrypt_container(&container, &pw("wrong"), &sealed),
        Err(PqVaultError::AuthenticationFailed)
    ));

    let rotated = f.dec.vault().rotate(&sealed, &pw("p@ss1"), &pw("p@ss2")).unwrap();
    assert_eq!(
        f.dec.decrypt_container(&container, &pw("p@ss2"), &rotated).unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(container, snapshot);
}

#[test]
fn round_trip_edge_lengths() {
    let f = fixture();
    let sealed = f.dec.vault().seal(&f.pair.private_key, &pw("pw")).unwrap();

    for len in [0usize, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 3 * CHUNK_SIZE + 7] {
        let plaintext: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
        let container = f.enc.encrypt_container(&plaintext, &f.pair.public_key).unwrap();
        let out = f.dec.decrypt_container(&container, &pw("pw"), &sealed).unwrap();
        assert_eq!(out, plaintext, "length {}", len);
    }
}

#[test]
fn encryption_is_not_deterministic() {
    let f = fixture();
    let codec = ContainerCodec::new();
    let a = f.enc.encrypt_container(b"same bytes", &f.pair.public_key).unwrap();
    let b = f.enc.encrypt_container(b"same bytes", &f.pair.public_key).unwrap();
    assert_ne!(a, b);

    let da = codec.decode(&a).unwrap();
    let db = codec.decode(&b).unwrap();
    assert_ne!(da.encapsulated_session_key, db.encapsulated_session_key);
    assert_ne!(da.chunks[0].nonce, db.chunks[0].nonce);
}

#[test]
fn wrong_password_is_authentication_failure() {
    let f = fixture();
    let sealed = f.dec.vault().seal(&f.pair.private_key, &pw("right")).unwrap();
    let container = f.enc.encrypt_container(b"secret", &f.pair.public_key).unwrap();

    for guess in ["", "Right", "right ", "wrong"] {
        assert!(matches!(
            f.dec.decrypt_container(&container, &pw(guess), &sealed),
            Err(PqVaultError::AuthenticationFailed)
        ));
    }
}

#[test]
fn wrong_key_pair_is_rejected() {
    let f = fixture();
    let other = f.enc.encapsulator().generate_key_pair().unwrap();
    let sealed_other = f.dec.vault().seal(&other.private_key, &pw("pw")).unwrap();

    let container = f.enc.encrypt_container(b"for the first key", &f.pair.public_key).unwrap();
    let err = f
        .dec
        .decrypt_container(&container, &pw("pw"), &sealed_other)
        .unwrap_err();
    assert!(matches!(
        err,
        PqVaultError::DecapsulationFailed(_) | PqVaultError::ChunkAuthenticationFailed(_)
    ));
}

#[test]
fn rotation_twice_keeps_old_containers_readable() {
    let f = fixture();
    let vault = f.dec.vault();
    let sealed = vault.seal(&f.pair.private_key, &pw("one")).unwrap();
    let container = f.enc.encrypt_container(&[9u8; 3000], &f.pair.public_key).unwrap();
    let expected = f.dec.decrypt_container(&container, &pw("one"), &sealed).unwrap();

    let second = vault.rotate(&sealed, &pw("one"), &pw("two")).unwrap();
    let third = vault.rotate(&second, &pw("two"), &pw("three")).unwrap();

    assert_eq!(f.dec.decrypt_container(&container, &pw("three"), &third).unwrap(), expected);
    assert!(matches!(
        f.dec.decrypt_container(&container, &pw("two"), &third),
        Err(PqVaultError::AuthenticationFailed)
    ));
}

#[test]
fn bit_flip_in_body_names_the_chunk() {
    let f = fixture();
    let plaintext = vec![0x5au8; 3 * CHUNK_SIZE];
    let container = f.enc.encrypt_container(&plaintext, &f.pair.public_key).unwrap();

    for index in 0..3 {
        let mut tampered = container.clone();
        tampered[chunk_offset(index) + NONCE_SIZE + 4 + 100] ^= 0x01;
        let err = f
            .dec
            .decrypt_with_private_key(&tampered, &f.pair.private_key)
            .unwrap_err();
        assert!(matches!(err, PqVaultError::ChunkAuthenticationFailed(i) if i == index));
    }
}

#[test]
fn bit_flip_in_nonce_fails_the_chunk() {
    let f = fixture();
    let container = f.enc.encrypt_container(&[7u8; 2 * CHUNK_SIZE], &f.pair.public_key).unwrap();

    let mut tampered = container.clone();
    tampered[chunk_offset(1) + 3] ^= 0x80;
    let err = f
        .dec
        .decrypt_with_private_key(&tampered, &f.pair.private_key)
        .unwrap_err();
    assert!(matches!(err, PqVaultError::ChunkAuthenticationFailed(1)));
}

#[test]
fn bit_flip_in_encapsulated_key_fails() {
    let f = fixture();
    let codec = ContainerCodec::new();
    let container = f.enc.encrypt_container(b"header tamper", &f.pair.public_key).unwrap();

    let mut decoded = codec.decode(&container).unwrap();
    decoded.encapsulated_session_key[42] ^= 0x04;
    let tampered = codec
        .encode(&decoded.encapsulated_session_key, &decoded.chunks)
        .unwrap();

    let err = f
        .dec
        .decrypt_with_private_key(&tampered, &f.pair.private_key)
        .unwrap_err();
    assert!(matches!(
        err,
        PqVaultError::DecapsulationFailed(_) | PqVaultError::ChunkAuthenticationFailed(_)
    ));
}

#[test]
fn truncated_container_fails_closed() {
    let f = fixture();
    let container = f.enc.encrypt_container(&[1u8; 1500], &f.pair.public_key).unwrap();

    let err = f
        .dec
        .decrypt_with_private_key(&container[..container.len() - 1], &f.pair.private_key)
        .unwrap_err();
    assert!(matches!(err, PqVaultError::TruncatedChunk { index: 1, .. }));

    let err = f
        .dec
        .decrypt_with_private_key(&container[..HEADER_SIZE - 1], &f.pair.private_key)
        .unwrap_err();
    assert!(matches!(err, PqVaultError::ContainerTooSmall(_)));
}

#[test]
fn dropping_trailing_chunks_leaves_a_decodable_prefix() {
    // Chunks carry no index or count, so removing whole trailing chunks
    // still yields a decodable prefix.
    let f = fixture();
    let plaintext: Vec<u8> = (0..2 * CHUNK_SIZE).map(|i| i as u8).collect();
    let container = f.enc.encrypt_container(&plaintext, &f.pair.public_key).unwrap();

    let out = f
        .dec
        .decrypt_with_private_key(&container[..chunk_offset(1)], &f.pair.private_key)
        .unwrap();
    assert_eq!(out, &plaintext[..CHUNK_SIZE]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..4 * CHUNK_SIZE)) {
        let f = fixture();
        let container = f.enc.encrypt_container(&plaintext, &f.pair.public_key).unwrap();

        let chunks = (plaintext.len() + CHUNK_SIZE - 1) / CHUNK_SIZE;
        prop_assert_eq!(
            container.len(),
            HEADER_SIZE + plaintext.len() + chunks * (NONCE_SIZE + 4 + TAG_SIZE)
        );

        let out = f.dec.decrypt_with_private_key(&container, &f.pair.private_key).unwrap();
        prop_assert_eq!(out, plaintext);
    }

    #[test]
    fn prop_any_chunk_bit_flip_is_detected(
        plaintext in proptest::collection::vec(any::<u8>(), 1..3 * CHUNK_SIZE),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let f = fixture();
        let container = f.enc.encrypt_container(&plaintext, &f.pair.public_key).unwrap();

        // Skip the 4-byte length fields; flipping those is a framing error.
        let chunk_stride = NONCE_SIZE + 4 + CHUNK_SIZE + TAG_SIZE;
        let body_positions: Vec<usize> = (HEADER_SIZE..container.len())
            .filter(|&p| {
                let within = (p - HEADER_SIZE) % chunk_stride;
                !(NONCE_SIZE..NONCE_SIZE + 4).contains(&within)
            })
            .collect();
        let target = body_positions[position.index(body_positions.len())];
        let expected_index = (target - HEADER_SIZE) / chunk_stride;

        let mut tampered = container;
        tampered[target] ^= 1 << bit;
        let err = f.dec.decrypt_with_private_key(&tampered, &f.pair.private_key).unwrap_err();
        prop_assert!(
            matches!(err, PqVaultError::ChunkAuthenticationFailed(i) if i == expected_index),
            "unexpected error {:?}",
            err
        );
    }
}
