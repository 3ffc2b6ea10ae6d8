//! Executor stages and the progress labels written to `sub_status`

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Queued,
    PreparingPayload,
    UploadingRemote,
    StartingRemoteTask,
    PollingRemote,
    FetchingResult,
}

impl WorkflowStage {
    /// Stages in execution order
    pub const ORDER: [WorkflowStage; 6] = [
        WorkflowStage::Queued,
        WorkflowStage::PreparingPayload,
        WorkflowStage::UploadingRemote,
        WorkflowStage::StartingRemoteTask,
        WorkflowStage::PollingRemote,
        WorkflowStage::FetchingResult,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            WorkflowStage::Queued => crate::task::QUEUED,
            WorkflowStage::PreparingPayload => "preparing_payload",
            WorkflowStage::UploadingRemote => "uploading",
            WorkflowStage::StartingRemoteTask => "starting_remote_task",
            WorkflowStage::PollingRemote => "polling",
            WorkflowStage::FetchingResult => "fetching_result",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_unique() {
        let mut labels: Vec<_> = WorkflowStage::ORDER.iter().map(|s| s.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), WorkflowStage::ORDER.len());
    }

    #[test]
    fn test_first_stage_matches_new_task_label() {
        assert_eq!(WorkflowStage::ORDER[0].to_string(), "queued");
    }
}
