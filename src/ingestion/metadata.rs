//! Metadata ingestion: people and memberships from the combined people
//! document, divisions and votes from CSV exports, and precomputed policy
//! summaries from CSV.
//!
//! Metadata is replaced wholesale on every run (truncate then insert), then
//! `party_at_time` is backfilled onto utterances by membership-interval
//! containment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::parser::extract_person_id;
use crate::records::{Division, Membership, Person, PolicySummary, Vote, VoteChoice};
use crate::stores::DebateStore;
use crate::types::RagError;

const PEOPLE_FILE: &str = "people.json";
const DIVISIONS_FILE: &str = "divisions.csv";
const VOTES_FILE: &str = "votes.csv";
const POLICY_SUMMARIES_FILE: &str = "policy_summaries.csv";

/// Dates in the metadata sources may be partial (a bare year) or malformed;
/// those collapse to `None` rather than failing the load.
fn parse_loose_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw?, "%Y-%m-%d").ok()
}

#[derive(Deserialize)]
struct PeopleFile {
    #[serde(default)]
    persons: Vec<RawPerson>,
    #[serde(default)]
    memberships: Vec<RawMembership>,
}

#[derive(Deserialize)]
struct RawPerson {
    id: Option<String>,
    #[serde(default)]
    other_names: Vec<RawName>,
}

#[derive(Deserialize, Default)]
struct RawName {
    note: Option<String>,
    start_date: Option<String>,
    given_name: Option<String>,
    additional_name: Option<String>,
    name: Option<String>,
    family_name: Option<String>,
    surname: Option<String>,
    honorific_prefix: Option<String>,
}

#[derive(Deserialize)]
struct RawMembership {
    id: Option<String>,
    person_id: Option<String>,
    on_behalf_of_id: Option<String>,
    post_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    start_reason: Option<String>,
    end_reason: Option<String>,
    #[serde(default)]
    identifiers: Vec<RawIdentifier>,
}

#[derive(Deserialize)]
struct RawIdentifier {
    scheme: Option<String>,
    identifier: Option<String>,
}

#[derive(Deserialize)]
struct DivisionRow {
    key: String,
    date: String,
    division_name: String,
}

#[derive(Deserialize)]
struct VoteRow {
    division_key: String,
    person_id: i64,
    membership_id: String,
    effective_vote: String,
}

#[derive(Deserialize)]
struct PolicySummaryRow {
    person_id: i64,
    policy_id: i64,
    period_id: Option<i64>,
    name: Option<String>,
    policy_description: Option<String>,
    context_description: Option<String>,
    distance_score: f64,
    start_year: Option<i32>,
    end_year: Option<i32>,
    num_votes_same: i64,
    num_strong_votes_same: i64,
    num_votes_different: i64,
    num_strong_votes_different: i64,
    num_votes_absent: i64,
    num_strong_votes_absent: i64,
    num_votes_abstain: i64,
    num_strong_votes_abstain: i64,
}

/// Reads the metadata source files.
pub struct MetadataLoader {
    metadata_dir: PathBuf,
}

impl MetadataLoader {
    pub fn new(metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
        }
    }

    /// Loads persons and memberships from the combined people document.
    /// Persons without any usable name record are dropped; memberships
    /// without a person id are dropped.
    pub fn load_people(&self) -> Result<(Vec<Person>, Vec<Membership>), RagError> {
        let raw = std::fs::read_to_string(self.metadata_dir.join(PEOPLE_FILE))?;
        let file: PeopleFile = serde_json::from_str(&raw)?;

        let mut persons = Vec::new();
        for raw_person in file.persons {
            let Some(id) = extract_person_id(raw_person.id.as_deref()) else {
                continue;
            };
            let Some((given_name, family_name, display_name)) =
                reconcile_name(&raw_person.other_names)
            else {
                continue;
            };
            persons.push(Person {
                id,
                given_name,
                family_name,
                display_name,
            });
        }

        let mut memberships = Vec::new();
        for raw in file.memberships {
            let Some(person_id) = extract_person_id(raw.person_id.as_deref()) else {
                continue;
            };
            let Some(membership_id) = raw.id else {
                continue;
            };
            let historichansard_id = raw
                .identifiers
                .iter()
                .find(|ident| ident.scheme.as_deref() == Some("historichansard_id"))
                .and_then(|ident| ident.identifier.clone());
            memberships.push(Membership {
                membership_id,
                person_id,
                party: raw.on_behalf_of_id,
                post_id: raw.post_id,
                start_date: parse_loose_date(raw.start_date.as_deref()),
                end_date: parse_loose_date(raw.end_date.as_deref()),
                start_reason: raw.start_reason,
                end_reason: raw.end_reason,
                historichansard_id,
            });
        }

        Ok((persons, memberships))
    }

    pub fn load_divisions(&self) -> Result<Vec<Division>, RagError> {
        let path = self.metadata_dir.join(DIVISIONS_FILE);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
        let mut divisions = Vec::new();
        for record in reader.deserialize() {
            let row: DivisionRow = record
                .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
            let Some(vote_date) = parse_loose_date(Some(&row.date)) else {
                warn!(key = %row.key, date = %row.date, "division with unparsable date skipped");
                continue;
            };
            divisions.push(Division {
                division_key: row.key,
                vote_date,
                description: row.division_name,
            });
        }
        Ok(divisions)
    }

    pub fn load_votes(&self) -> Result<Vec<Vote>, RagError> {
        let path = self.metadata_dir.join(VOTES_FILE);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
        let mut votes = Vec::new();
        for record in reader.deserialize() {
            let row: VoteRow = record
                .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
            votes.push(Vote {
                division_key: row.division_key,
                person_id: row.person_id,
                membership_id: row.membership_id,
                vote: VoteChoice::parse(&row.effective_vote)?,
            });
        }
        Ok(votes)
    }

    /// Precomputed per person/policy/period aggregates. The file is optional;
    /// absence means no voting-record data.
    pub fn load_policy_summaries(&self) -> Result<Vec<PolicySummary>, RagError> {
        let path = self.metadata_dir.join(POLICY_SUMMARIES_FILE);
        if !path.exists() {
            info!(path = %path.display(), "no policy summaries file, skipping");
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
        let mut summaries = Vec::new();
        for record in reader.deserialize() {
            let row: PolicySummaryRow = record
                .map_err(|err| RagError::InvalidDocument(format!("{}: {err}", path.display())))?;
            summaries.push(PolicySummary {
                person_id: row.person_id,
                policy_id: row.policy_id,
                period_id: row.period_id,
                name: row.name,
                policy_description: row.policy_description,
                context_description: row.context_description,
                distance_score: row.distance_score,
                start_year: row.start_year,
                end_year: row.end_year,
                num_votes_same: row.num_votes_same,
                num_strong_votes_same: row.num_strong_votes_same,
                num_votes_different: row.num_votes_different,
                num_strong_votes_different: row.num_strong_votes_different,
                num_votes_absent: row.num_votes_absent,
                num_strong_votes_absent: row.num_strong_votes_absent,
                num_votes_abstain: row.num_votes_abstain,
                num_strong_votes_abstain: row.num_strong_votes_abstain,
            });
        }
        Ok(summaries)
    }
}

/// Picks the best name record: prefer `note == "Main"` with the latest start
/// date, else the first record. Returns `(given, family, display)`; `None`
/// when no display name can be built at all.
fn reconcile_name(names: &[RawName]) -> Option<(Option<String>, Option<String>, String)> {
    if names.is_empty() {
        return None;
    }

    let mut main_records: Vec<&RawName> = names
        .iter()
        .filter(|record| record.note.as_deref() == Some("Main"))
        .collect();
    main_records.sort_by(|a, b| {
        b.start_date
            .as_deref()
            .unwrap_or("")
            .cmp(a.start_date.as_deref().unwrap_or(""))
    });
    let record = main_records.first().copied().unwrap_or(&names[0]);

    let given_name = record
        .given_name
        .clone()
        .or_else(|| record.additional_name.clone())
        .or_else(|| {
            record
                .name
                .as_deref()
                .and_then(|name| name.split_whitespace().next())
                .map(str::to_string)
        });
    let family_name = record
        .family_name
        .clone()
        .or_else(|| record.surname.clone())
        .or_else(|| {
            record
                .name
                .as_deref()
                .and_then(|name| name.split_whitespace().last())
                .map(str::to_string)
        });

    let display_name = match &record.honorific_prefix {
        Some(honorific) => match (&given_name, &family_name) {
            (_, Some(family)) => Some(format!("{honorific} {family}")),
            (Some(given), None) => Some(format!("{honorific} {given}")),
            (None, None) => Some(honorific.clone()),
        },
        None => {
            let parts: Vec<&str> = [given_name.as_deref(), family_name.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
    }?;

    Some((given_name, family_name, display_name))
}

/// Full-replace metadata pipeline.
pub struct MetadataPipeline {
    loader: MetadataLoader,
    store: Arc<dyn DebateStore>,
}

impl MetadataPipeline {
    pub fn new(metadata_dir: impl AsRef<Path>, store: Arc<dyn DebateStore>) -> Self {
        Self {
            loader: MetadataLoader::new(metadata_dir.as_ref()),
            store,
        }
    }

    pub async fn run(&self) -> Result<(), RagError> {
        info!("loading metadata files");
        let (persons, memberships) = self.loader.load_people()?;
        let divisions = self.loader.load_divisions()?;
        let votes = self.loader.load_votes()?;
        let summaries = self.loader.load_policy_summaries()?;

        info!("truncating metadata tables");
        self.store.truncate_metadata().await?;

        info!(
            persons = persons.len(),
            memberships = memberships.len(),
            divisions = divisions.len(),
            votes = votes.len(),
            summaries = summaries.len(),
            "inserting metadata"
        );
        self.store.insert_people(persons, memberships).await?;
        self.store.insert_divisions(divisions, votes).await?;
        self.store.insert_policy_summaries(summaries).await?;

        let updated = self.store.backfill_party_at_time().await?;
        info!(updated, "metadata pipeline complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn name(note: &str, start: &str, family: &str, honorific: Option<&str>) -> RawName {
        RawName {
            note: Some(note.to_string()),
            start_date: Some(start.to_string()),
            family_name: Some(family.to_string()),
            honorific_prefix: honorific.map(str::to_string),
            ..RawName::default()
        }
    }

    #[test]
    fn main_record_with_latest_start_date_wins() {
        let names = vec![
            name("Main", "2010-05-06", "Older", None),
            name("Main", "2019-12-12", "Newer", None),
            name("Alternate", "2024-01-01", "Alias", None),
        ];
        let (_, family, display) = reconcile_name(&names).unwrap();
        assert_eq!(family.as_deref(), Some("Newer"));
        assert_eq!(display, "Newer");
    }

    #[test]
    fn honorific_prefixes_the_family_name() {
        let names = vec![name("Main", "2019-12-12", "Benn", Some("Sir"))];
        let (_, _, display) = reconcile_name(&names).unwrap();
        assert_eq!(display, "Sir Benn");
    }

    #[test]
    fn fallback_splits_the_combined_name() {
        let names = vec![RawName {
            name: Some("Diane Julie Abbott".to_string()),
            ..RawName::default()
        }];
        let (given, family, display) = reconcile_name(&names).unwrap();
        assert_eq!(given.as_deref(), Some("Diane"));
        assert_eq!(family.as_deref(), Some("Abbott"));
        assert_eq!(display, "Diane Abbott");
    }

    #[test]
    fn people_document_parses_persons_and_memberships() {
        let dir = tempdir().unwrap();
        let people = serde_json::json!({
            "persons": [
                {
                    "id": "uk.org.publicwhip/person/10001",
                    "other_names": [
                        {"note": "Main", "given_name": "Alice", "family_name": "Member"}
                    ]
                },
                {"id": "uk.org.publicwhip/person/10002", "other_names": []}
            ],
            "memberships": [
                {
                    "id": "uk.org.publicwhip/member/500",
                    "person_id": "uk.org.publicwhip/person/10001",
                    "on_behalf_of_id": "labour",
                    "start_date": "2019-12-12",
                    "end_date": "2024-05-30",
                    "identifiers": [
                        {"scheme": "historichansard_id", "identifier": "ms-alice"}
                    ]
                }
            ]
        });
        std::fs::write(
            dir.path().join("people.json"),
            serde_json::to_string(&people).unwrap(),
        )
        .unwrap();

        let loader = MetadataLoader::new(dir.path());
        let (persons, memberships) = loader.load_people().unwrap();

        // The person without a name record is dropped.
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].id, 10001);
        assert_eq!(persons[0].display_name, "Alice Member");

        assert_eq!(memberships.len(), 1);
        let membership = &memberships[0];
        assert_eq!(membership.person_id, 10001);
        assert_eq!(membership.party.as_deref(), Some("labour"));
        assert_eq!(membership.historichansard_id.as_deref(), Some("ms-alice"));
        assert_eq!(
            membership.start_date,
            NaiveDate::from_ymd_opt(2019, 12, 12)
        );
    }

    #[test]
    fn votes_csv_maps_effective_vote() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("votes.csv"),
            "division_key,person_id,membership_id,effective_vote\n\
             pw-2024-01-1,10001,m500,aye\n\
             pw-2024-01-1,10002,m501,absent\n",
        )
        .unwrap();

        let votes = MetadataLoader::new(dir.path()).load_votes().unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].vote, VoteChoice::Aye);
        assert_eq!(votes[1].vote, VoteChoice::Absent);
    }

    #[test]
    fn partial_dates_collapse_to_none() {
        assert_eq!(parse_loose_date(Some("2015")), None);
        assert_eq!(parse_loose_date(Some("")), None);
        assert_eq!(parse_loose_date(None), None);
        assert_eq!(
            parse_loose_date(Some("2015-05-07")),
            NaiveDate::from_ymd_opt(2015, 5, 7)
        );
    }
}
