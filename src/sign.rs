use anyhow::{anyhow, Context as _, Result};
use openpgp::cert::Cert;
use openpgp::parse::stream::{
    DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Message, Signer};
use openpgp::KeyHandle;
use sequoia_openpgp as openpgp;
use std::io::Write;
use std::path::Path;

/// A signing key resolved from the `-k` argument. A `gpg://` prefix
/// loads the certificate but leaves the secret material in the running
/// gpg-agent.
pub struct SigningKey {
    cert: Cert,
    offloaded: bool,
}

impl SigningKey {
    pub fn from_arg(arg: &str) -> Result<Self> {
        match arg.strip_prefix("gpg://") {
            Some(path) => Ok(Self {
                cert: load_certificate(path)?,
                offloaded: true,
            }),
            None => Ok(Self {
                cert: load_certificate(arg)?,
                offloaded: false,
            }),
        }
    }

    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    fn detached_signature(&self, content: &[u8]) -> Result<Vec<u8>> {
        let policy = StandardPolicy::new();

        if self.offloaded {
            // secret lives in gpg-agent; select the public half and
            // hand the signing operation to the agent
            let key = self
                .cert
                .keys()
                .with_policy(&policy, None)
                .for_signing()
                .alive()
                .revoked(false)
                .supported()
                .next()
                .ok_or_else(|| no_signing_key(&self.cert))?;
            let ctx = sequoia_gpg_agent::gnupg::Context::new()
                .context("gpg-agent is not reachable")?;
            let agent_pair = sequoia_gpg_agent::KeyPair::new_for_gnupg_context(&ctx, key.key())
                .context("gpg-agent holds no secret for the signing key")?;

            emit_signature(agent_pair, content)
        } else {
            let key = self
                .cert
                .keys()
                .secret()
                .with_policy(&policy, None)
                .for_signing()
                .alive()
                .revoked(false)
                .supported()
                .next()
                .ok_or_else(|| no_signing_key(&self.cert))?;
            let pair = key.key().clone().into_keypair()?;

            emit_signature(pair, content)
        }
    }
}

pub fn load_certificate<P: AsRef<Path>>(cert_path: P) -> Result<Cert> {
    Cert::from_file(cert_path.as_ref())
}

/// Write a detached binary signature over `path` to `sig_path`.
pub fn sign_file(key: &SigningKey, path: &Path, sig_path: &Path) -> Result<()> {
    let content = std::fs::read(path)?;
    let sig = key.detached_signature(&content)?;
    std::fs::write(sig_path, sig)?;

    Ok(())
}

fn no_signing_key(cert: &Cert) -> anyhow::Error {
    anyhow!("certificate {} has no usable signing key", cert.fingerprint())
}

fn emit_signature<S>(signing_pair: S, content: &[u8]) -> Result<Vec<u8>>
where
    S: openpgp::crypto::Signer + Send + Sync + 'static,
{
    let mut sig = Vec::new();
    let mut signer = Signer::new(Message::new(&mut sig), signing_pair)
        .detached()
        .build()?;
    signer.write_all(content)?;
    signer.finalize()?;

    Ok(sig)
}

struct Helper<'a> {
    cert: &'a Cert,
}

impl VerificationHelper for Helper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.cert.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|r| r.is_ok()) {
                    return Ok(());
                }
            }
        }

        Err(anyhow!("no valid signature found"))
    }
}

/// Check `sig_path` as a detached signature over `path`.
pub fn verify_file(cert: &Cert, path: &Path, sig_path: &Path) -> Result<()> {
    let policy = StandardPolicy::new();
    let helper = Helper { cert };
    let mut verifier =
        DetachedVerifierBuilder::from_file(sig_path)?.with_policy(&policy, None, helper)?;
    verifier.verify_file(path)?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_certificate() -> Cert {
    use openpgp::cert::CertBuilder;
    use openpgp::types::KeyFlags;

    let (cert, _) = CertBuilder::new()
        .add_userid("Repo Test <repo@example.org>")
        .add_subkey(KeyFlags::empty().set_signing(), None, None)
        .generate()
        .unwrap();

    cert
}

#[test]
fn test_sign_verify_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("archive");
    let sig = dir.path().join("archive.sig");
    std::fs::write(&data, b"index contents").unwrap();

    let cert = test_certificate();
    let key = SigningKey {
        cert: cert.clone(),
        offloaded: false,
    };
    sign_file(&key, &data, &sig).unwrap();
    verify_file(&cert, &data, &sig).unwrap();

    // a modified archive must no longer verify
    std::fs::write(&data, b"tampered contents").unwrap();
    assert!(verify_file(&cert, &data, &sig).is_err());
}

#[test]
fn test_verify_rejects_foreign_key() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("archive");
    let sig = dir.path().join("archive.sig");
    std::fs::write(&data, b"index contents").unwrap();

    let key = SigningKey {
        cert: test_certificate(),
        offloaded: false,
    };
    sign_file(&key, &data, &sig).unwrap();

    let other = test_certificate();
    assert!(verify_file(&other, &data, &sig).is_err());
}
