use crate::error::{Error, Result};
use crate::grants::{policy_logical_id, Grant};
use crate::regions::CLOUDFRONT_CERTIFICATE_REGION;
use crate::resources::*;

use super::{Declaration, Stack};

/// the certificate, the distribution and the record must all name the same
/// domain, and that domain must live in the zone that validates and serves it.
/// only called after every reference resolved.
pub(crate) fn check_domains(stack: &Stack) -> Result<()> {
    for decl in stack.declarations() {
        match decl {
            Declaration::Certificate(cert) => {
                if let CertificateValidation::Dns(zone) = &cert.validation {
                    let zone_name = stack.zone_name(zone).unwrap_or_default();
                    let domain = cert.domain_name.trim_start_matches("*.");
                    if !in_zone(zone_name, domain) {
                        return Err(Error::DomainMismatch {
                            resource: cert.logical_id.clone(),
                            expected: zone_name.to_string(),
                            found: cert.domain_name.clone(),
                        });
                    }
                }
            }
            Declaration::Distribution(distribution) => {
                let Some(cert_ref) = &distribution.certificate else {
                    if !distribution.domain_names.is_empty() {
                        return Err(Error::invalid_attribute(
                            "domain_names",
                            format!("distribution '{}' has domain names but no certificate", distribution.logical_id),
                        ));
                    }
                    continue;
                };
                let Some(cert) = stack.certificate(cert_ref.logical_id()) else { continue };
                for name in &distribution.domain_names {
                    if !domain_covers(&cert.domain_name, name) {
                        return Err(Error::DomainMismatch {
                            resource: distribution.logical_id.clone(),
                            expected: cert.domain_name.clone(),
                            found: name.clone(),
                        });
                    }
                }
            }
            Declaration::Record(record) => {
                let zone_name = stack.zone_name(&record.zone).unwrap_or_default();
                let name = record.resolved_name(zone_name);
                if !in_zone(zone_name, &name) {
                    return Err(Error::DomainMismatch {
                        resource: record.logical_id.clone(),
                        expected: zone_name.to_string(),
                        found: name,
                    });
                }
                if let RecordTarget::Distribution(target) = &record.target {
                    let Some(distribution) = stack.distribution(target.logical_id()) else { continue };
                    if !distribution.domain_names.iter().any(|d| d.eq_ignore_ascii_case(&name)) {
                        return Err(Error::DomainMismatch {
                            resource: record.logical_id.clone(),
                            expected: distribution.domain_names.join(", "),
                            found: name,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn check_certificate_region(stack: &Stack) -> Result<()> {
    if stack.region() == CLOUDFRONT_CERTIFICATE_REGION {
        return Ok(());
    }
    for decl in stack.declarations() {
        if let Declaration::Distribution(d) = decl {
            if d.certificate.is_some() {
                return Err(Error::CertificateRegion {
                    distribution: d.logical_id.clone(),
                    region: stack.region().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// user outputs may not take a key synthesis adds on its own, since deploy.sh reads those.
pub(crate) fn check_outputs(stack: &Stack) -> Result<()> {
    let defaults = stack.default_outputs();
    for (name, _) in &stack.outputs {
        if defaults.iter().any(|(d, _)| d == name) {
            return Err(Error::DuplicateResource(format!("output {name}")));
        }
    }
    Ok(())
}

/// ids synthesis generates must not already be taken by a declaration.
pub(crate) fn check_generated_ids(stack: &Stack) -> Result<()> {
    for grant in stack.grants() {
        let Grant::Read { bucket, .. } = grant else { continue };
        let policy_id = policy_logical_id(bucket);
        if stack.get(&policy_id).is_some() {
            return Err(Error::DuplicateResource(policy_id));
        }
    }
    Ok(())
}

/// a distribution whose identity cannot read its bucket still deploys, it just serves 403s.
pub(crate) fn warn_missing_grants(stack: &Stack) {
    for decl in stack.declarations() {
        let Declaration::Distribution(d) = decl else { continue };
        let origin = &d.default_behavior.origin;
        let has = |want: &Grant| stack.grants().any(|g| g == want);
        let read = Grant::Read { bucket: origin.bucket.clone(), grantee: origin.origin_access_identity.clone() };
        if !has(&read) {
            tracing::warn!(distribution = %d.logical_id, bucket = %origin.bucket.logical_id(), "origin access identity has no read grant on the origin bucket");
        }
        if let Some(Bucket { encryption: BucketEncryption::Kms(key), .. }) = stack.bucket(origin.bucket.logical_id()) {
            let decrypt = Grant::Decrypt { key: key.clone(), grantee: origin.origin_access_identity.clone() };
            if !has(&decrypt) {
                tracing::warn!(distribution = %d.logical_id, key = %key.logical_id(), "origin access identity has no decrypt grant on the bucket key");
            }
        }
    }
}
