//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Record State Machine: pure functions from `(record, job config)` to the
//! next stage(s) to dispatch, and from a stage outcome to a `RecordStatus`.
//!
//! Both functions are deterministic and free of I/O; callers may invoke them
//! any number of times without side effects (spec §8 purity laws).

use crate::model::{JobConfig, Record, RecordStatus, Stage, TemplateType};

fn succeeded(record: &Record, stage: Stage) -> bool {
    record
        .stages
        .get(&stage)
        .map(|info| info.completed && info.success == Some(true))
        .unwrap_or(false)
}

fn completed(record: &Record, stage: Stage) -> bool {
    record.stages.get(&stage).map(|info| info.completed).unwrap_or(false)
}

fn is_hotfolder(job_config: &JobConfig) -> bool {
    matches!(
        job_config.template.as_ref().map(|t| t.kind),
        Some(TemplateType::Hotfolder)
    )
}

/// Returns the next stage(s) to dispatch, or `None` if the record is done.
/// Rules are evaluated most-advanced-first; the first matching rule wins.
pub fn get_next_stage(record: &Record, job_config: &JobConfig) -> Option<Vec<Stage>> {
    if succeeded(record, Stage::Ingest) {
        return None;
    }
    if succeeded(record, Stage::Transfer) {
        return Some(vec![Stage::Ingest]);
    }
    if succeeded(record, Stage::BuildSip) {
        if job_config.test_mode {
            return None;
        }
        return Some(vec![Stage::Transfer]);
    }
    if succeeded(record, Stage::PrepareIp) {
        return Some(vec![Stage::BuildSip]);
    }
    if succeeded(record, Stage::ValidationMetadata) {
        let payload_settled =
            completed(record, Stage::ValidationPayload) || record.bitstream || record.skip_object_validation;
        if payload_settled {
            return Some(vec![Stage::PrepareIp]);
        }
        return None;
    }

    if is_hotfolder(job_config) {
        if succeeded(record, Stage::ImportIps) {
            if record.bitstream || record.skip_object_validation {
                return Some(vec![Stage::ValidationMetadata]);
            }
            return Some(vec![Stage::ValidationMetadata, Stage::ValidationPayload]);
        }
        return Some(vec![Stage::ImportIps]);
    }

    if succeeded(record, Stage::BuildIp) {
        if record.bitstream || record.skip_object_validation {
            return Some(vec![Stage::ValidationMetadata]);
        }
        return Some(vec![Stage::ValidationMetadata, Stage::ValidationPayload]);
    }
    if succeeded(record, Stage::ImportIes) {
        return Some(vec![Stage::BuildIp]);
    }
    Some(vec![Stage::ImportIes])
}

/// Derives the record's overall status after `stage` has completed.
/// Monotonic: once a record leaves `InProcess`, further calls with the same
/// stage return the same value.
pub fn get_record_status(stage: Stage, record: &Record) -> RecordStatus {
    if record.status != RecordStatus::InProcess {
        return record.status;
    }
    match record.stages.get(&stage) {
        Some(info) if info.success == Some(false) => stage.error_status(),
        _ => RecordStatus::InProcess,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobConfig, RecordStageInfo, Template};
    use serde_json::json;

    fn plugin_job_config() -> JobConfig {
        let mut jc = JobConfig::new("job-1");
        jc.template = Some(Template {
            kind: TemplateType::Plugin,
            additional_information: json!({}),
        });
        jc
    }

    fn mark_success(record: &mut Record, stage: Stage) {
        record.stages.insert(stage, RecordStageInfo {
            completed: true,
            success: Some(true),
            ..Default::default()
        });
    }

    #[test]
    fn fresh_record_starts_at_import_ies() {
        let record = Record::new("r1");
        let job_config = plugin_job_config();
        assert_eq!(get_next_stage(&record, &job_config), Some(vec![Stage::ImportIes]));
    }

    #[test]
    fn after_import_ies_goes_to_build_ip() {
        let mut record = Record::new("r1");
        mark_success(&mut record, Stage::ImportIes);
        let job_config = plugin_job_config();
        assert_eq!(get_next_stage(&record, &job_config), Some(vec![Stage::BuildIp]));
    }

    #[test]
    fn after_build_ip_dispatches_both_validations_by_default() {
        let mut record = Record::new("r1");
        mark_success(&mut record, Stage::ImportIes);
        mark_success(&mut record, Stage::BuildIp);
        let job_config = plugin_job_config();
        assert_eq!(
            get_next_stage(&record, &job_config),
            Some(vec![Stage::ValidationMetadata, Stage::ValidationPayload])
        );
    }

    #[test]
    fn bitstream_skips_payload_validation() {
        let mut record = Record::new("r1");
        record.bitstream = true;
        mark_success(&mut record, Stage::ImportIes);
        mark_success(&mut record, Stage::BuildIp);
        let job_config = plugin_job_config();
        assert_eq!(
            get_next_stage(&record, &job_config),
            Some(vec![Stage::ValidationMetadata])
        );
    }

    #[test]
    fn metadata_waits_for_payload_before_prepare_ip() {
        let mut record = Record::new("r1");
        mark_success(&mut record, Stage::ImportIes);
        mark_success(&mut record, Stage::BuildIp);
        mark_success(&mut record, Stage::ValidationMetadata);
        let job_config = plugin_job_config();
        assert_eq!(get_next_stage(&record, &job_config), None);

        record.stages.insert(Stage::ValidationPayload, RecordStageInfo {
            completed: true,
            success: Some(false),
            ..Default::default()
        });
        assert_eq!(get_next_stage(&record, &job_config), Some(vec![Stage::PrepareIp]));
    }

    #[test]
    fn test_mode_terminates_after_build_sip() {
        let mut record = Record::new("r1");
        mark_success(&mut record, Stage::ImportIes);
        mark_success(&mut record, Stage::BuildIp);
        mark_success(&mut record, Stage::ValidationMetadata);
        mark_success(&mut record, Stage::ValidationPayload);
        mark_success(&mut record, Stage::PrepareIp);
        mark_success(&mut record, Stage::BuildSip);
        let mut job_config = plugin_job_config();
        job_config.test_mode = true;
        assert_eq!(get_next_stage(&record, &job_config), None);
    }

    #[test]
    fn hotfolder_enters_via_import_ips() {
        let record = Record::new("r1");
        let mut job_config = plugin_job_config();
        job_config.template = Some(Template {
            kind: TemplateType::Hotfolder,
            additional_information: json!({}),
        });
        assert_eq!(get_next_stage(&record, &job_config), Some(vec![Stage::ImportIps]));
    }

    #[test]
    fn status_is_monotonic_once_terminal() {
        let mut record = Record::new("r1");
        record.status = RecordStatus::TransferError;
        mark_success(&mut record, Stage::Ingest);
        assert_eq!(get_record_status(Stage::Ingest, &record), RecordStatus::TransferError);
    }

    #[test]
    fn failed_stage_maps_to_its_error_status() {
        let mut record = Record::new("r1");
        record.stages.insert(Stage::BuildIp, RecordStageInfo {
            completed: true,
            success: Some(false),
            ..Default::default()
        });
        assert_eq!(get_record_status(Stage::BuildIp, &record), RecordStatus::BuildIpError);
    }
}
