use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tradecast_core::{ColdLeadId, JobId, OrgId, OutreachId, RecipientId, StagingId, TechnicianId};
use tradecast_model::{
    ColdLead, Job, JobStatus, Outreach, Recipient, StagingRecord, Technician, Trade,
};

use super::{Datastore, DatastoreError};

/// In-memory datastore.
///
/// Intended for tests/dev. Not optimized for performance; uniqueness
/// guarantees match what a relational backend would enforce with unique
/// indexes on `outreach.job_id` and `cold_lead.email`.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    jobs: RwLock<HashMap<JobId, Job>>,
    technicians: RwLock<HashMap<TechnicianId, Technician>>,
    staging: RwLock<HashMap<StagingId, StagingRecord>>,
    cold_leads: RwLock<HashMap<ColdLeadId, ColdLead>>,
    outreaches: RwLock<HashMap<OutreachId, Outreach>>,
    recipients: RwLock<HashMap<OutreachId, Vec<Recipient>>>,
}

fn poisoned(_: impl std::fmt::Debug) -> DatastoreError {
    DatastoreError::backend("lock poisoned")
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Seeding and diagnostic helpers for tests and dev harnesses (the
/// harvester/registry/job-creation flows that own these rows live outside
/// this core). Lock poisoning panics here; the `Datastore` impl maps it to
/// an error instead.
#[cfg(any(test, feature = "testing"))]
impl InMemoryDatastore {
    pub fn seed_job(&self, job: Job) {
        self.jobs.write().unwrap().insert(job.id, job);
    }

    pub fn seed_technician(&self, technician: Technician) {
        self.technicians
            .write()
            .unwrap()
            .insert(technician.id, technician);
    }

    pub fn seed_staging(&self, record: StagingRecord) {
        self.staging.write().unwrap().insert(record.id, record);
    }

    pub fn seed_cold_lead(&self, lead: ColdLead) {
        self.cold_leads.write().unwrap().insert(lead.id, lead);
    }

    /// Test/diagnostic access to one outreach's recipients.
    pub fn recipients_of(&self, outreach_id: OutreachId) -> Vec<Recipient> {
        self.recipients
            .read()
            .unwrap()
            .get(&outreach_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Test/diagnostic access to one staging record.
    pub fn staging_record(&self, id: StagingId) -> Option<StagingRecord> {
        self.staging.read().unwrap().get(&id).cloned()
    }

    pub fn cold_lead(&self, id: ColdLeadId) -> Option<ColdLead> {
        self.cold_leads.read().unwrap().get(&id).cloned()
    }

    pub fn technician(&self, id: TechnicianId) -> Option<Technician> {
        self.technicians.read().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, DatastoreError> {
        Ok(self.jobs.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<(), DatastoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| DatastoreError::not_found(format!("job {id}")))?;
        job.status = status;
        Ok(())
    }

    async fn available_technicians(
        &self,
        org_id: Option<OrgId>,
        trade: &Trade,
    ) -> Result<Vec<Technician>, DatastoreError> {
        let technicians = self.technicians.read().map_err(poisoned)?;
        Ok(technicians
            .values()
            .filter(|t| t.accepts(trade))
            .filter(|t| t.org_id.is_none() || t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn mark_technician_dispatched(
        &self,
        id: TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError> {
        let mut technicians = self.technicians.write().map_err(poisoned)?;
        let tech = technicians
            .get_mut(&id)
            .ok_or_else(|| DatastoreError::not_found(format!("technician {id}")))?;
        tech.mark_dispatched(at);
        Ok(())
    }

    async fn unselected_staging(
        &self,
        state: &str,
        limit: usize,
    ) -> Result<Vec<StagingRecord>, DatastoreError> {
        let staging = self.staging.read().map_err(poisoned)?;
        let mut records: Vec<StagingRecord> = staging
            .values()
            .filter(|r| r.state.eq_ignore_ascii_case(state) && !r.ai_selected && !r.moved_to_cold)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn mark_staging_selected(
        &self,
        selections: &[(StagingId, u8)],
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError> {
        let mut staging = self.staging.write().map_err(poisoned)?;
        for (id, score) in selections {
            let record = staging
                .get_mut(id)
                .ok_or_else(|| DatastoreError::not_found(format!("staging record {id}")))?;
            record.mark_selected(*score, at);
        }
        Ok(())
    }

    async fn selected_unverified_staging(
        &self,
        state: &str,
        limit: usize,
    ) -> Result<Vec<StagingRecord>, DatastoreError> {
        let staging = self.staging.read().map_err(poisoned)?;
        let mut records: Vec<StagingRecord> = staging
            .values()
            .filter(|r| {
                r.state.eq_ignore_ascii_case(state)
                    && r.ai_selected
                    && r.email_verified.is_none()
                    && !r.moved_to_cold
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.ai_score.cmp(&a.ai_score));
        records.truncate(limit);
        Ok(records)
    }

    async fn record_staging_verification(
        &self,
        id: StagingId,
        email: Option<String>,
        confidence: Option<u8>,
        verified: bool,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError> {
        let mut staging = self.staging.write().map_err(poisoned)?;
        let record = staging
            .get_mut(&id)
            .ok_or_else(|| DatastoreError::not_found(format!("staging record {id}")))?;
        record.record_verification(email, confidence, verified, at);
        Ok(())
    }

    async fn promotable_staging(&self, state: &str) -> Result<Vec<StagingRecord>, DatastoreError> {
        let staging = self.staging.read().map_err(poisoned)?;
        Ok(staging
            .values()
            .filter(|r| {
                r.state.eq_ignore_ascii_case(state)
                    && r.ai_selected
                    && r.email_verified == Some(true)
                    && !r.moved_to_cold
            })
            .cloned()
            .collect())
    }

    async fn mark_staging_moved(&self, id: StagingId) -> Result<(), DatastoreError> {
        let mut staging = self.staging.write().map_err(poisoned)?;
        let record = staging
            .get_mut(&id)
            .ok_or_else(|| DatastoreError::not_found(format!("staging record {id}")))?;
        record.mark_moved();
        Ok(())
    }

    async fn find_cold_lead_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ColdLead>, DatastoreError> {
        let leads = self.cold_leads.read().map_err(poisoned)?;
        Ok(leads
            .values()
            .find(|l| l.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_cold_lead(&self, lead: ColdLead) -> Result<ColdLeadId, DatastoreError> {
        let mut leads = self.cold_leads.write().map_err(poisoned)?;
        if leads
            .values()
            .any(|l| l.email.eq_ignore_ascii_case(&lead.email))
        {
            return Err(DatastoreError::conflict(format!(
                "cold lead email already exists: {}",
                lead.email
            )));
        }
        let id = lead.id;
        leads.insert(id, lead);
        Ok(id)
    }

    async fn count_undispatched_cold(
        &self,
        state: &str,
        trade: &Trade,
    ) -> Result<u64, DatastoreError> {
        Ok(self.dispatchable_cold_leads(state, trade).await?.len() as u64)
    }

    async fn dispatchable_cold_leads(
        &self,
        state: &str,
        trade: &Trade,
    ) -> Result<Vec<ColdLead>, DatastoreError> {
        let leads = self.cold_leads.read().map_err(poisoned)?;
        Ok(leads
            .values()
            .filter(|l| {
                l.state.eq_ignore_ascii_case(state)
                    && (l.trade.matches(trade) || l.trade.is_general())
                    && l.dispatch_count == 0
                    && l.dispatchable()
            })
            .cloned()
            .collect())
    }

    async fn mark_cold_lead_dispatched(
        &self,
        id: ColdLeadId,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError> {
        let mut leads = self.cold_leads.write().map_err(poisoned)?;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| DatastoreError::not_found(format!("cold lead {id}")))?;
        lead.mark_dispatched(at);
        Ok(())
    }

    async fn outreach_for_job(&self, job_id: JobId) -> Result<Option<Outreach>, DatastoreError> {
        let outreaches = self.outreaches.read().map_err(poisoned)?;
        Ok(outreaches.values().find(|o| o.job_id == job_id).cloned())
    }

    async fn insert_outreach(&self, outreach: Outreach) -> Result<(), DatastoreError> {
        let mut outreaches = self.outreaches.write().map_err(poisoned)?;
        if outreaches.values().any(|o| o.job_id == outreach.job_id) {
            return Err(DatastoreError::conflict(format!(
                "outreach already exists for job {}",
                outreach.job_id
            )));
        }
        outreaches.insert(outreach.id, outreach);
        Ok(())
    }

    async fn update_outreach(&self, outreach: Outreach) -> Result<(), DatastoreError> {
        let mut outreaches = self.outreaches.write().map_err(poisoned)?;
        if !outreaches.contains_key(&outreach.id) {
            return Err(DatastoreError::not_found(format!(
                "outreach {}",
                outreach.id
            )));
        }
        outreaches.insert(outreach.id, outreach);
        Ok(())
    }

    async fn insert_recipients(&self, recipients: Vec<Recipient>) -> Result<(), DatastoreError> {
        let mut stored = self.recipients.write().map_err(poisoned)?;
        for recipient in recipients {
            stored
                .entry(recipient.outreach_id)
                .or_default()
                .push(recipient);
        }
        Ok(())
    }

    async fn mark_recipients_sent(&self, ids: &[RecipientId]) -> Result<(), DatastoreError> {
        let mut stored = self.recipients.write().map_err(poisoned)?;
        for recipients in stored.values_mut() {
            for recipient in recipients.iter_mut() {
                if ids.contains(&recipient.id) {
                    recipient.email_sent = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradecast_model::{Trade, Urgency};

    fn store() -> InMemoryDatastore {
        InMemoryDatastore::new()
    }

    #[tokio::test]
    async fn second_outreach_for_same_job_conflicts() {
        let store = store();
        let job_id = JobId::new();

        store.insert_outreach(Outreach::new(job_id, 3)).await.unwrap();
        let err = store
            .insert_outreach(Outreach::new(job_id, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, DatastoreError::Conflict(_)));
        assert!(store.outreach_for_job(job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_cold_lead_email_conflicts() {
        let store = store();
        let record = StagingRecord::new("Bay Area Cooling", Trade::new("HVAC"), "FL");
        let lead_a = ColdLead::promoted_from(&record, "Info@BayArea.com".into());
        let lead_b = ColdLead::promoted_from(&record, "info@bayarea.com".into());

        store.insert_cold_lead(lead_a).await.unwrap();
        let err = store.insert_cold_lead(lead_b).await.unwrap_err();

        assert!(matches!(err, DatastoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn available_technicians_excludes_other_orgs() {
        let store = store();
        let trade = Trade::new("HVAC");
        let my_org = OrgId::new();
        let other_org = OrgId::new();

        store.seed_technician(
            Technician::new("Public Pat", "pat@example.com", trade.clone()),
        );
        store.seed_technician(
            Technician::new("Org Olive", "olive@example.com", trade.clone()).with_org(my_org),
        );
        store.seed_technician(
            Technician::new("Rival Ray", "ray@example.com", trade.clone()).with_org(other_org),
        );

        let found = store
            .available_technicians(Some(my_org), &trade)
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(names.contains(&"Public Pat"));
        assert!(names.contains(&"Org Olive"));
    }

    #[tokio::test]
    async fn unselected_staging_is_newest_first_and_stage_gated() {
        let store = store();
        let mut old = StagingRecord::new("Old Co", Trade::new("HVAC"), "FL");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        let recent = StagingRecord::new("Recent Co", Trade::new("HVAC"), "FL");
        let mut selected = StagingRecord::new("Selected Co", Trade::new("HVAC"), "FL");
        selected.mark_selected(80, Utc::now());

        store.seed_staging(old);
        store.seed_staging(recent);
        store.seed_staging(selected);

        let records = store.unselected_staging("FL", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].business_name, "Recent Co");
        assert_eq!(records[1].business_name, "Old Co");
    }

    #[tokio::test]
    async fn dispatchable_cold_excludes_dispatched_and_unsubscribed() {
        let store = store();
        let trade = Trade::new("HVAC");
        let record = StagingRecord::new("A", trade.clone(), "FL");

        let fresh = ColdLead::promoted_from(&record, "fresh@example.com".into());
        let mut dispatched = ColdLead::promoted_from(&record, "sent@example.com".into());
        dispatched.mark_dispatched(Utc::now());
        let mut unsubscribed = ColdLead::promoted_from(&record, "gone@example.com".into());
        unsubscribed.unsubscribed_at = Some(Utc::now());

        store.seed_cold_lead(fresh);
        store.seed_cold_lead(dispatched);
        store.seed_cold_lead(unsubscribed);

        let leads = store.dispatchable_cold_leads("FL", &trade).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "fresh@example.com");
        assert_eq!(store.count_undispatched_cold("FL", &trade).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn general_trade_leads_match_any_trade_query() {
        let store = store();
        let record = StagingRecord::new("General Services LLC", Trade::new("General"), "FL");
        store.seed_cold_lead(ColdLead::promoted_from(
            &record,
            "info@generalservices.com".into(),
        ));

        let leads = store
            .dispatchable_cold_leads("FL", &Trade::new("HVAC"))
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "info@generalservices.com");
        assert_eq!(
            store
                .count_undispatched_cold("FL", &Trade::new("HVAC"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn job_status_update_roundtrips() {
        let store = store();
        let job = Job::new(Trade::new("HVAC"), Urgency::Urgent, "Tampa", "FL");
        let id = job.id;
        store.seed_job(job);

        store
            .update_job_status(id, JobStatus::Dispatched)
            .await
            .unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dispatched);
    }
}
