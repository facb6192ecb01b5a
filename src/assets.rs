// CLASSIFICATION: COMMUNITY
// Filename: assets.rs v0.4
// Date Modified: 2026-07-25
// Author: Lukas Bower

//! Content-addressed store of trusted boot-asset root hashes.
//!
//! The store keeps the root hash of every boot asset that may take part in
//! a PCR policy. Roots come from a hash tree over fixed-size file blocks:
//! each leaf is the SHA-256 of one zero-padded 4096-byte block, and every
//! level above is built by concatenating the previous level's hashes,
//! re-splitting the concatenation into zero-padded 4096-byte blocks and
//! hashing those. The fold repeats until a single hash remains; a single
//! leaf is its own root. Storing hash-tree roots instead of flat file
//! hashes is what lets large PE images be verified on streaming reads
//! without ever holding them in memory.
//!
//! The persisted form is deliberately stable; changing the fold would
//! invalidate every recorded root.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::context::CoreContext;
use crate::error::Error;
use crate::fs::Fs;
use crate::hashed_file::{hash_block, HashedFile, HASH_BLOCK_SIZE};
use crate::secboot::PeDigest;
use crate::tcglog;

/// Where the trusted-assets file lives.
pub const TRUSTED_ASSETS_PATH: &str = "/var/lib/sealboot/trusted-assets.json";

/// The kernel-exposed measurement log consulted by
/// [`TrustedAssets::trust_current_boot`].
pub const TCG_LOG_PATH: &str = "/sys/kernel/security/tpm0/binary_bios_measurements";

const ALG_SHA256: &str = "sha256";

/// Serialized file shape. Unknown keys are tolerated on read; on write the
/// keys come out in declaration order.
#[derive(Debug, Serialize, Deserialize)]
struct AssetsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hashes: Option<Vec<String>>,
}

/// The set of boot-asset root hashes accepted for PCR policy computation.
#[derive(Debug, Default)]
pub struct TrustedAssets {
    loaded: Vec<[u8; 32]>,
    new_assets: Vec<[u8; 32]>,
}

impl TrustedAssets {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted store. A missing file is an empty store.
    pub fn read(ctx: &CoreContext) -> Result<Self> {
        let path = Path::new(TRUSTED_ASSETS_PATH);
        let mut file = match ctx.fs.open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot open {}", path.display()))
            }
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let parsed: AssetsFile = serde_json::from_slice(&raw)
            .with_context(|| format!("cannot parse {}", path.display()))?;

        match parsed.alg.as_deref() {
            Some(ALG_SHA256) => {}
            Some(other) => return Err(Error::UnsupportedAlg(other.to_string()).into()),
            None => return Err(Error::UnknownAlg.into()),
        }

        let mut loaded = Vec::new();
        for encoded in parsed.hashes.unwrap_or_default() {
            let decoded = BASE64_STANDARD
                .decode(&encoded)
                .context("cannot decode trusted asset hash")?;
            let hash: [u8; 32] = decoded
                .try_into()
                .map_err(|_| anyhow::anyhow!("trusted asset hash has the wrong length"))?;
            loaded.push(hash);
        }

        Ok(Self {
            loaded,
            new_assets: Vec::new(),
        })
    }

    /// The persisted hash set.
    pub fn loaded(&self) -> &[[u8; 32]] {
        &self.loaded
    }

    /// The hashes recorded during this run, duplicates included.
    pub fn new_assets(&self) -> &[[u8; 32]] {
        &self.new_assets
    }

    /// Record a root as trusted. `loaded` stays duplicate-free; the run log
    /// keeps every occurrence so [`Self::remove_obsolete`] knows what was
    /// seen this run.
    fn trust_root(&mut self, root: [u8; 32]) {
        if !self.loaded.contains(&root) {
            self.loaded.push(root);
        }
        self.new_assets.push(root);
    }

    /// Hash every regular file directly inside `dir` and trust the results.
    pub fn trust_new_from_dir(&mut self, ctx: &CoreContext, dir: &Path) -> Result<()> {
        let entries = ctx
            .fs
            .read_dir(dir)
            .with_context(|| format!("cannot enumerate {}", dir.display()))?;
        for entry in entries {
            if entry.is_dir || entry.is_symlink {
                continue;
            }
            let path = dir.join(&entry.name);
            let root = compute_file_root(ctx.fs.as_ref(), &path)
                .with_context(|| format!("cannot hash {}", path.display()))?;
            self.trust_root(root);
        }
        Ok(())
    }

    /// Fold `leaves` into a root and report whether it is trusted.
    pub fn check_leaf_hashes(&self, leaves: &[[u8; 32]]) -> bool {
        self.loaded.contains(&fold_root(leaves))
    }

    /// Drop every loaded hash that was not recorded during this run.
    pub fn remove_obsolete(&mut self) {
        let new_assets = &self.new_assets;
        self.loaded.retain(|hash| new_assets.contains(hash));
    }

    /// Persist the loaded set atomically, newline-terminated.
    pub fn save(&self, ctx: &CoreContext) -> Result<()> {
        let path = Path::new(TRUSTED_ASSETS_PATH);
        let dir = path.parent().expect("well-known path has a parent");

        let file = AssetsFile {
            alg: Some(ALG_SHA256.to_string()),
            hashes: Some(
                self.loaded
                    .iter()
                    .map(|hash| BASE64_STANDARD.encode(hash))
                    .collect(),
            ),
        };
        let mut payload = serde_json::to_vec(&file).context("cannot serialize trusted assets")?;
        payload.push(b'\n');

        ctx.fs
            .mkdir_all(dir, 0o755)
            .with_context(|| format!("cannot create {}", dir.display()))?;
        let mut writer = ctx
            .fs
            .temp_file(dir, ".trusted-assets")
            .with_context(|| format!("cannot create temporary file in {}", dir.display()))?;
        writer
            .write_all(&payload)
            .context("cannot write trusted assets")?;
        writer.flush()?;
        let tmp_path = writer.path().to_path_buf();
        drop(writer);
        ctx.fs
            .rename(&tmp_path, path)
            .with_context(|| format!("cannot move trusted assets into {}", path.display()))?;
        Ok(())
    }

    /// Trust the boot applications measured into the current boot.
    ///
    /// Walks the TCG measurement log for
    /// `EV_EFI_BOOT_SERVICES_APPLICATION` events whose device path names a
    /// file, resolves that file inside `esp`, and trusts its root hash iff
    /// the file's Authenticode digest matches the digest in the log. Files
    /// that are gone or measure differently are skipped; other assets in
    /// the log still get trusted.
    pub fn trust_current_boot(
        &mut self,
        ctx: &CoreContext,
        pe: &dyn PeDigest,
        esp: &Path,
    ) -> Result<()> {
        let mut raw = Vec::new();
        ctx.fs
            .open(Path::new(TCG_LOG_PATH))
            .and_then(|mut f| f.read_to_end(&mut raw))
            .with_context(|| format!("cannot read {}", TCG_LOG_PATH))?;
        let events = tcglog::parse_log(&raw).context("cannot parse measurement log")?;

        for event in &events {
            if event.event_type != tcglog::EV_EFI_BOOT_SERVICES_APPLICATION {
                continue;
            }
            let Some(device_path) = event.image_load_device_path() else {
                continue;
            };
            let Ok(device_path) = efivar_wire::DevicePath::from_bytes(device_path.to_vec()) else {
                log::warn!("skipping boot application event with a malformed device path");
                continue;
            };
            let Some(file_path) = device_path.file_path() else {
                continue;
            };
            let Some(logged_digest) = event.sha256_digest() else {
                continue;
            };

            let relative = file_path.replace('\\', "/");
            let path = esp.join(relative.trim_start_matches('/'));

            let mut file = match ctx.fs.open(&path) {
                Ok(file) => file,
                Err(_) => {
                    log::info!("measured file {} is gone, skipping", path.display());
                    continue;
                }
            };
            let computed = pe
                .compute_pe_digest(file.as_mut())
                .with_context(|| format!("cannot digest {}", path.display()))?;
            if computed != logged_digest {
                log::info!(
                    "measured file {} no longer matches its log digest, skipping",
                    path.display()
                );
                continue;
            }

            let root = compute_file_root(ctx.fs.as_ref(), &path)
                .with_context(|| format!("cannot hash {}", path.display()))?;
            self.trust_root(root);
        }
        Ok(())
    }
}

/// Fold a leaf list into its root hash.
///
/// Each level concatenates the previous level's hashes and re-blocks the
/// concatenation into zero-padded `HASH_BLOCK_SIZE` chunks; a level of one
/// hash is the root. No leaves fold to the digest of nothing.
pub fn fold_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest([]).into();
    }
    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        let concatenated: Vec<u8> = level.iter().flatten().copied().collect();
        level = concatenated.chunks(HASH_BLOCK_SIZE).map(hash_block).collect();
    }
    level[0]
}

/// Compute the hash-tree root of a file.
pub fn compute_file_root(fs: &dyn Fs, path: &Path) -> Result<[u8; 32]> {
    let file = fs.open(path)?;
    let hashed = HashedFile::new(file);
    let leaves = hashed.finish()?;
    Ok(fold_root(&leaves))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efivars::mock::MockEfiVariables;
    use crate::fs::mem::MemFs;
    use crate::EfiArch;
    use std::rc::Rc;

    fn context() -> (MemFs, CoreContext) {
        let fs = MemFs::new();
        let vars = MockEfiVariables::new(Rc::new(fs.clone()));
        let ctx = CoreContext::with_arch(Rc::new(fs.clone()), Rc::new(vars), EfiArch::X64);
        (fs, ctx)
    }

    fn pattern(first: u8, seq_len: u8, repeats: usize) -> Vec<u8> {
        let seq: Vec<u8> = (0..seq_len).map(|i| i.wrapping_add(first)).collect();
        seq.iter()
            .copied()
            .cycle()
            .take(seq.len() * repeats)
            .collect()
    }

    fn unhex(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn new_store_is_empty() {
        let assets = TrustedAssets::new();
        assert!(assets.loaded().is_empty());
        assert!(assets.new_assets().is_empty());
    }

    #[test]
    fn read_parses_hashes() {
        let (fs, ctx) = context();
        fs.write_file(
            TRUSTED_ASSETS_PATH,
            br#"
{
    "alg": "sha256",
    "hashes": [
        "tbudgBSg+bHWHiHnlteNzN8TUvI80ygS9IULh4rklEw=",
        "fYZelZskZpGMmGOvypQtD7idfJrAyZuvw3SVBN7ZdzA="
    ]
}"#,
        );

        let assets = TrustedAssets::read(&ctx).unwrap();
        assert_eq!(
            assets.loaded(),
            [
                unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
                unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
            ]
        );
        assert!(assets.new_assets().is_empty());
    }

    #[test]
    fn read_missing_file_is_empty() {
        let (_fs, ctx) = context();
        let assets = TrustedAssets::read(&ctx).unwrap();
        assert!(assets.loaded().is_empty());
    }

    #[test]
    fn read_missing_alg_fails() {
        let (fs, ctx) = context();
        fs.write_file(TRUSTED_ASSETS_PATH, br#"{"hashes": []}"#);
        let err = TrustedAssets::read(&ctx).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::UnknownAlg)));
    }

    #[test]
    fn read_unsupported_alg_fails() {
        let (fs, ctx) = context();
        fs.write_file(TRUSTED_ASSETS_PATH, br#"{"alg": "foo", "hashes": []}"#);
        let err = TrustedAssets::read(&ctx).unwrap_err();
        match err.downcast_ref() {
            Some(Error::UnsupportedAlg(alg)) => assert_eq!(alg, "foo"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_tolerates_unknown_keys() {
        let (fs, ctx) = context();
        fs.write_file(
            TRUSTED_ASSETS_PATH,
            br#"{"alg": "sha256", "hashes": [], "comment": "spare"}"#,
        );
        assert!(TrustedAssets::read(&ctx).unwrap().loaded().is_empty());
    }

    #[test]
    fn trust_new_from_dir_appends_roots() {
        let (fs, ctx) = context();
        // Just under 10 blocks: a tree of depth 2.
        fs.write_file("/foo/1", &pattern(0, 199, 200));
        // Just over 170 blocks: depth 3, with a partially-filled block in
        // the middle level.
        fs.write_file("/foo/2", &pattern(0, 199, 3500));

        let mut assets = TrustedAssets::read(&ctx).unwrap();
        assets.loaded = vec![
            unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
            unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
        ];

        assets.trust_new_from_dir(&ctx, Path::new("/foo")).unwrap();

        assert_eq!(
            assets.loaded(),
            [
                unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
                unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
                unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
                unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
            ]
        );
        assert_eq!(
            assets.new_assets(),
            [
                unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
                unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
            ]
        );
    }

    #[test]
    fn trust_new_from_dir_dedups_loaded() {
        let (fs, ctx) = context();
        fs.write_file("/foo/1", b"some contents");

        let mut assets = TrustedAssets::read(&ctx).unwrap();
        assets.loaded = vec![
            unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
            unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
            unhex("8c3bb60fb858eccd3e85ba8fd3a85d9014f468defbdf6bc0c46891b2049eca46"),
        ];

        assets.trust_new_from_dir(&ctx, Path::new("/foo")).unwrap();

        assert_eq!(assets.loaded().len(), 3);
        assert_eq!(
            assets.new_assets(),
            [unhex(
                "8c3bb60fb858eccd3e85ba8fd3a85d9014f468defbdf6bc0c46891b2049eca46"
            )]
        );
    }

    #[test]
    fn remove_obsolete_keeps_only_seen_hashes() {
        let mut assets = TrustedAssets::new();
        assets.loaded = vec![
            unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
            unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
            unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
            unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
        ];
        assets.new_assets = vec![
            unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
            unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
            unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
        ];

        assets.remove_obsolete();

        assert_eq!(
            assets.loaded(),
            [
                unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
                unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
            ]
        );
        assert_eq!(assets.new_assets().len(), 3);
    }

    #[test]
    fn save_writes_canonical_json() {
        let (fs, ctx) = context();
        let mut assets = TrustedAssets::new();
        assets.loaded = vec![
            unhex("b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c"),
            unhex("7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"),
            unhex("73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec"),
            unhex("6c05c5017b4e584ce0e4e77b42e7399c0392407216803f24233def5c038adc7c"),
        ];

        assets.save(&ctx).unwrap();

        assert_eq!(
            fs.read_file(TRUSTED_ASSETS_PATH).unwrap(),
            b"{\"alg\":\"sha256\",\"hashes\":[\"tbudgBSg+bHWHiHnlteNzN8TUvI80ygS9IULh4rklEw=\",\"fYZelZskZpGMmGOvypQtD7idfJrAyZuvw3SVBN7ZdzA=\",\"c+YMt+LZyLpHpQfGR/mziJAPWl3DPCTUqV+E9N2F3Ow=\",\"bAXFAXtOWEzg5Od7Quc5nAOSQHIWgD8kIz3vXAOK3Hw=\"]}\n"
        );
    }

    #[test]
    fn check_leaf_hashes_folds_and_looks_up() {
        let data = pattern(0, 199, 200);
        let leaves: Vec<[u8; 32]> = data.chunks(HASH_BLOCK_SIZE).map(hash_block).collect();

        let mut assets = TrustedAssets::new();
        assert!(!assets.check_leaf_hashes(&leaves));
        assets.trust_root(unhex(
            "73e60cb7e2d9c8ba47a507c647f9b388900f5a5dc33c24d4a95f84f4dd85dcec",
        ));
        assert!(assets.check_leaf_hashes(&leaves));
    }

    #[test]
    fn fold_root_of_nothing_is_stable() {
        assert_eq!(fold_root(&[]), <[u8; 32]>::from(Sha256::digest([])));
        let one = [7u8; 32];
        assert_eq!(fold_root(&[one]), one);
    }

    /// Maps file contents to their well-known measurement digests, the way
    /// the firmware's Authenticode measurement would.
    struct FakePeDigest;

    impl PeDigest for FakePeDigest {
        fn compute_pe_digest(&self, file: &mut dyn crate::fs::FsRead) -> Result<Vec<u8>> {
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            match content.as_slice() {
                b"shim1" => Ok(Sha256::digest(b"mock shim PE").to_vec()),
                b"kernel1" => Ok(Sha256::digest(b"mock kernel PE").to_vec()),
                other => Err(anyhow::anyhow!("unexpected file content {other:?}")),
            }
        }
    }

    fn write_mock_tcglog(fs: &MemFs, shim_pe: &[u8]) {
        use crate::tcglog::testutil::LogWriter;
        use crate::tcglog::EV_SEPARATOR;
        use efivar_wire::DevicePath;

        let mut writer = LogWriter::new();
        for pcr in 0..=7 {
            writer.extend_event(pcr, EV_SEPARATOR, &[0, 0, 0, 0], &[0, 0, 0, 0]);
        }
        let shim_path = DevicePath::new_hard_drive_file(
            1,
            0x800,
            0x10_0000,
            [0u8; 16],
            "\\EFI\\ubuntu\\shimx64.efi",
        );
        writer.image_load_event(4, shim_pe, shim_path.as_bytes());
        let kernel_path = DevicePath::new_file("\\EFI\\ubuntu\\kernel.efi-1.0-1-generic");
        writer.image_load_event(4, b"mock kernel PE", kernel_path.as_bytes());

        fs.write_file(TCG_LOG_PATH, &writer.finish());
    }

    #[test]
    fn trust_current_boot_trusts_measured_files() {
        let (fs, ctx) = context();
        fs.write_file("/boot/efi/EFI/ubuntu/shimx64.efi", b"shim1");
        fs.write_file("/boot/efi/EFI/ubuntu/kernel.efi-1.0-1-generic", b"kernel1");
        fs.write_file("/boot/efi/EFI/ubuntu/kernel.efi-1.0-2-generic", b"kernel2");
        write_mock_tcglog(&fs, b"mock shim PE");

        let mut assets = TrustedAssets::new();
        assets
            .trust_current_boot(&ctx, &FakePeDigest, Path::new("/boot/efi"))
            .unwrap();

        let expected = [
            unhex("efbef08d5d3787d609ec6b55fabc36c7f212140b97a88606a39dc8f732368147"),
            unhex("7e8c4310bd1e228888917fb5f87920426dbecd64ea7d6c2256740f80e39dcf6f"),
        ];
        assert_eq!(assets.loaded(), expected);
        assert_eq!(assets.new_assets(), expected);
    }

    #[test]
    fn trust_current_boot_rejects_digest_mismatch() {
        let (fs, ctx) = context();
        fs.write_file("/boot/efi/EFI/ubuntu/shimx64.efi", b"shim1");
        fs.write_file("/boot/efi/EFI/ubuntu/kernel.efi-1.0-1-generic", b"kernel1");
        // The log measured a different shim than what is on disk now.
        write_mock_tcglog(&fs, b"mock shim PE v2");

        let mut assets = TrustedAssets::new();
        assets
            .trust_current_boot(&ctx, &FakePeDigest, Path::new("/boot/efi"))
            .unwrap();

        let expected = [unhex(
            "7e8c4310bd1e228888917fb5f87920426dbecd64ea7d6c2256740f80e39dcf6f",
        )];
        assert_eq!(assets.loaded(), expected);
        assert_eq!(assets.new_assets(), expected);
    }

    #[test]
    fn trust_current_boot_skips_missing_files() {
        let (fs, ctx) = context();
        fs.write_file("/boot/efi/EFI/ubuntu/shimx64.efi", b"shim1");
        fs.write_file("/boot/efi/EFI/ubuntu/kernel.efi-1.0-2-generic", b"kernel2");
        write_mock_tcglog(&fs, b"mock shim PE");

        let mut assets = TrustedAssets::new();
        assets
            .trust_current_boot(&ctx, &FakePeDigest, Path::new("/boot/efi"))
            .unwrap();

        let expected = [unhex(
            "efbef08d5d3787d609ec6b55fabc36c7f212140b97a88606a39dc8f732368147",
        )];
        assert_eq!(assets.loaded(), expected);
        assert_eq!(assets.new_assets(), expected);
    }
}
