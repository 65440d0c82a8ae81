use crate::config::DemoPluginConfig;
use crate::error::HydrationError;
use crate::plugin::{PluginSupportedFeature, ProfileData, ProfilePlugin, ProfilePopulationMetadata};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

pub const DEMO_PLUGIN_ID: &str = "DEMO";

const STATUSES: [&str; 4] = ["Approved", "Under Review", "Submitted", "Declined"];

/// Local mock data source. Payloads depend only on the request, so repeated
/// populations of the same request are byte-identical.
pub struct DemoProfilePlugin {
    features: Vec<PluginSupportedFeature>,
    simulated_delay: Duration,
}

impl DemoProfilePlugin {
    pub fn new(config: &DemoPluginConfig) -> Self {
        Self::with_delay(Duration::from_millis(config.simulated_delay_ms))
    }

    pub fn with_delay(simulated_delay: Duration) -> Self {
        Self {
            features: vec![
                PluginSupportedFeature::new("PROGRAM1", "SUBMISSIONS", "Program 1 grant submissions"),
                PluginSupportedFeature::new("PROGRAM1", "ORGINFO", "Program 1 organization information"),
                PluginSupportedFeature::new("PROGRAM1", "PAYMENTS", "Program 1 payment history"),
                PluginSupportedFeature::new("PROGRAM1", "CONTACTS", "Program 1 contacts"),
                PluginSupportedFeature::new("PROGRAM2", "SUBMISSIONS", "Program 2 grant submissions"),
                PluginSupportedFeature::new("PROGRAM2", "ORGINFO", "Program 2 organization information"),
            ],
            simulated_delay,
        }
    }

    fn generate_payload(&self, metadata: &ProfilePopulationMetadata) -> Value {
        let provider = metadata.provider.to_ascii_uppercase();
        let key = metadata.key.to_ascii_uppercase();
        let seed = Seed::from(metadata.profile_id);

        let data = match (provider.as_str(), key.as_str()) {
            ("PROGRAM1" | "PROGRAM2", "SUBMISSIONS") => submissions(&provider, &seed),
            ("PROGRAM1" | "PROGRAM2", "ORGINFO") => organization(&provider, &seed),
            ("PROGRAM1", "PAYMENTS") => payments(&seed),
            ("PROGRAM1", "CONTACTS") => contacts(&seed),
            _ => return self.discovery(metadata),
        };

        json!({
            "ProfileId": metadata.profile_id,
            "PluginId": DEMO_PLUGIN_ID,
            "Provider": metadata.provider,
            "Key": metadata.key,
            "Source": "Demo System",
            "Data": data,
            "AdditionalData": metadata.additional_data,
        })
    }

    fn discovery(&self, metadata: &ProfilePopulationMetadata) -> Value {
        let providers: Vec<Value> = self
            .supported_providers()
            .into_iter()
            .map(|provider| {
                let keys = self.supported_keys(&provider);
                json!({ "Provider": provider, "Keys": keys })
            })
            .collect();

        json!({
            "ProfileId": metadata.profile_id,
            "PluginId": DEMO_PLUGIN_ID,
            "Provider": metadata.provider,
            "Key": metadata.key,
            "Source": "Demo System",
            "Message": "Demo data available for the providers and keys listed below",
            "AvailableProviders": providers,
        })
    }
}

#[async_trait]
impl ProfilePlugin for DemoProfilePlugin {
    fn plugin_id(&self) -> &str {
        DEMO_PLUGIN_ID
    }

    fn supported_features(&self) -> &[PluginSupportedFeature] {
        &self.features
    }

    async fn populate_profile(
        &self,
        metadata: &ProfilePopulationMetadata,
        cancel: &CancellationToken,
    ) -> Result<ProfileData, HydrationError> {
        info!(
            "Demo plugin populating profile for ProfileId: {} ({}/{})",
            metadata.profile_id, metadata.provider, metadata.key
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(HydrationError::Cancelled),
            _ = tokio::time::sleep(self.simulated_delay) => {}
        }

        let json_data = serde_json::to_string(&self.generate_payload(metadata))
            .map_err(HydrationError::population_failed)?;

        info!(
            "Demo plugin successfully populated profile for ProfileId: {}",
            metadata.profile_id
        );
        Ok(ProfileData::for_request(metadata, json_data))
    }
}

/// Stable pseudo-random source derived from the profile id
struct Seed {
    bits: u128,
    short: String,
}

impl From<Uuid> for Seed {
    fn from(id: Uuid) -> Self {
        let simple = id.simple().to_string();
        Self {
            bits: id.as_u128(),
            short: simple[..8].to_ascii_uppercase(),
        }
    }
}

impl Seed {
    /// Value in `0..modulus` taken from a slice of the id's bits
    fn pick(&self, slot: u32, modulus: u64) -> u64 {
        let shifted = self.bits >> ((slot * 13) % 112);
        (shifted as u64 & 0xFFFF) % modulus.max(1)
    }
}

fn program_name(provider: &str) -> &'static str {
    match provider {
        "PROGRAM1" => "Community Development Grant",
        _ => "Rural Innovation Fund",
    }
}

fn submissions(provider: &str, seed: &Seed) -> Value {
    let count = 2 + seed.pick(0, 4) as usize;
    let mut total_requested = 0u64;
    let mut approved = 0usize;

    let items: Vec<Value> = (0..count)
        .map(|i| {
            let slot = i as u32 + 1;
            let status = STATUSES[seed.pick(slot, STATUSES.len() as u64) as usize];
            let amount = 5_000 + seed.pick(slot + 10, 20) * 2_500;
            total_requested += amount;
            if status == "Approved" {
                approved += 1;
            }
            json!({
                "SubmissionId": format!("SUB-{}-{:03}", seed.short, i + 1),
                "ProgramName": program_name(provider),
                "Status": status,
                "SubmittedDate": format!("2024-{:02}-{:02}", 1 + (i % 12), 1 + seed.pick(slot + 20, 28)),
                "AmountRequested": amount,
            })
        })
        .collect();

    json!({
        "Submissions": items,
        "Summary": {
            "TotalSubmissions": count,
            "ApprovedSubmissions": approved,
            "TotalAmountRequested": total_requested,
        },
    })
}

fn organization(provider: &str, seed: &Seed) -> Value {
    json!({
        "Organization": {
            "OrganizationName": format!("Demo Organization {}", seed.short),
            "RegistrationNumber": format!("REG-{:06}", seed.pick(1, 1_000_000)),
            "OrganizationType": if seed.pick(2, 2) == 0 { "Non-Profit" } else { "Society" },
            "YearEstablished": 1970 + seed.pick(3, 50),
            "Program": program_name(provider),
        }
    })
}

fn payments(seed: &Seed) -> Value {
    let count = 1 + seed.pick(4, 3) as usize;
    let mut total_paid = 0u64;
    let items: Vec<Value> = (0..count)
        .map(|i| {
            let amount = 1_000 + seed.pick(i as u32 + 30, 10) * 1_000;
            total_paid += amount;
            json!({
                "PaymentId": format!("PAY-{}-{:03}", seed.short, i + 1),
                "Amount": amount,
                "PaymentDate": format!("2024-{:02}-28", 2 + i * 3),
                "Status": "Paid",
            })
        })
        .collect();

    json!({
        "Payments": items,
        "Summary": { "TotalPayments": count, "TotalPaid": total_paid },
    })
}

fn contacts(seed: &Seed) -> Value {
    json!({
        "Contacts": [
            {
                "Name": "Demo User",
                "Role": "Primary Contact",
                "Email": "demo.user@example.com",
                "Phone": format!("+1-555-{:04}", seed.pick(5, 10_000)),
            },
            {
                "Name": "Demo Signing Authority",
                "Role": "Signing Authority",
                "Email": "signing.authority@example.com",
                "Phone": format!("+1-555-{:04}", seed.pick(6, 10_000)),
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submissions_summary_matches_array() {
        let seed = Seed::from(Uuid::new_v4());
        let data = submissions("PROGRAM1", &seed);
        let count = data["Submissions"].as_array().unwrap().len() as u64;
        assert_eq!(data["Summary"]["TotalSubmissions"].as_u64(), Some(count));
        assert!((2..=5).contains(&count));
    }

    #[test]
    fn test_seed_is_stable() {
        let id = Uuid::new_v4();
        assert_eq!(Seed::from(id).pick(3, 97), Seed::from(id).pick(3, 97));
        assert_eq!(Seed::from(id).short.len(), 8);
    }
}
