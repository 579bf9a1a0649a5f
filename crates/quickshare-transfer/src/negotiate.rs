/// Batch negotiation.
///
/// ```text
/// sender                         receiver
///   PendingBatch::propose  --->  validate_proposal
///                                DecisionDraft (per-file accept/reject)
///   PendingBatch::resolve  <---  DecisionDraft::finalize
/// ```
///
/// The proposal is immutable once sent; the receiver edits a draft and emits
/// exactly one decision when it is finalized.

use std::collections::{BTreeSet, HashSet};

use quickshare_types::{BatchProposal, FileEntry, PeerMessage, PermissionGrant};

use crate::error::TransferError;
use crate::source::FileDescriptor;

/// Outcome of negotiation as seen by both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDecision {
    Granted { accepted_names: BTreeSet<String> },
    Denied,
}

impl BatchDecision {
    /// An empty acceptance set is a denial.
    pub fn from_accepted<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepted_names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if accepted_names.is_empty() {
            Self::Denied
        } else {
            Self::Granted { accepted_names }
        }
    }

    pub fn accepted_count(&self) -> usize {
        match self {
            Self::Granted { accepted_names } => accepted_names.len(),
            Self::Denied => 0,
        }
    }

    pub fn into_message(self) -> PeerMessage {
        match self {
            Self::Granted { accepted_names } => PeerMessage::PermissionGranted(PermissionGrant {
                accepted_files: accepted_names.into_iter().collect(),
            }),
            Self::Denied => PeerMessage::PermissionDenied,
        }
    }
}

/// Local check before anything is sent: non-empty, unique names.
pub fn validate_entries(entries: &[FileEntry]) -> Result<(), TransferError> {
    if entries.is_empty() {
        return Err(TransferError::invalid_batch("no files selected"));
    }
    if let Some(name) = first_duplicate(entries) {
        return Err(TransferError::invalid_batch(format!("duplicate file name {}", name)));
    }
    if entries.len() > u32::MAX as usize {
        return Err(TransferError::invalid_batch("too many files"));
    }
    Ok(())
}

/// Check a proposal received from the peer.
pub fn validate_proposal(proposal: &BatchProposal) -> Result<(), TransferError> {
    if proposal.files.is_empty() {
        return Err(TransferError::violation("empty batch proposal"));
    }
    if proposal.total_count as usize != proposal.files.len() {
        return Err(TransferError::violation(format!(
            "proposal totalCount {} but {} files listed",
            proposal.total_count,
            proposal.files.len()
        )));
    }
    if let Some(name) = first_duplicate(&proposal.files) {
        return Err(TransferError::violation(format!("duplicate file name {} in proposal", name)));
    }
    Ok(())
}

fn first_duplicate(entries: &[FileEntry]) -> Option<&str> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(|e| e.name.as_str())
        .find(|name| !seen.insert(*name))
}

/// Sender-side files held while waiting for the peer's decision.
#[derive(Debug)]
pub struct PendingBatch {
    files: Vec<FileDescriptor>,
}

/// What the sender does once the decision arrives.
#[derive(Debug)]
pub enum Resolution {
    /// Peer declined; report and return to idle.
    Denied,
    /// Granted, but no held file matched. Completes without streaming.
    NothingAccepted,
    /// Accepted files in their originally proposed order.
    Stream(Vec<FileDescriptor>),
}

impl PendingBatch {
    pub fn propose(files: Vec<FileDescriptor>) -> Result<(Self, BatchProposal), TransferError> {
        let entries: Vec<FileEntry> = files.iter().map(FileDescriptor::entry).collect();
        validate_entries(&entries)?;
        Ok((Self { files }, BatchProposal::new(entries)))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Filter the held files by the decision, dropping rejected descriptors.
    pub fn resolve(self, decision: BatchDecision) -> Resolution {
        let accepted_names = match decision {
            BatchDecision::Denied => return Resolution::Denied,
            BatchDecision::Granted { accepted_names } => accepted_names,
        };
        let accepted: Vec<FileDescriptor> = self
            .files
            .into_iter()
            .filter(|f| accepted_names.contains(&f.name))
            .collect();
        if accepted.is_empty() {
            Resolution::NothingAccepted
        } else {
            Resolution::Stream(accepted)
        }
    }
}

/// Receiver's per-file choice over an immutable proposal. Everything starts
/// rejected.
#[derive(Debug, Clone)]
pub struct DecisionDraft {
    proposal: BatchProposal,
    accepted: BTreeSet<String>,
}

impl DecisionDraft {
    pub fn new(proposal: BatchProposal) -> Self {
        Self {
            proposal,
            accepted: BTreeSet::new(),
        }
    }

    pub fn proposal(&self) -> &BatchProposal {
        &self.proposal
    }

    /// Returns false if `name` is not part of the proposal.
    pub fn accept(&mut self, name: &str) -> bool {
        if !self.proposal.contains(name) {
            return false;
        }
        self.accepted.insert(name.to_string());
        true
    }

    pub fn reject(&mut self, name: &str) {
        self.accepted.remove(name);
    }

    /// Flip one file. Returns the new accepted state.
    pub fn toggle(&mut self, name: &str) -> bool {
        if self.accepted.remove(name) {
            false
        } else {
            self.accept(name)
        }
    }

    pub fn accept_all(&mut self) {
        self.accepted = self.proposal.names().map(str::to_string).collect();
    }

    pub fn reject_all(&mut self) {
        self.accepted.clear();
    }

    pub fn is_accepted(&self, name: &str) -> bool {
        self.accepted.contains(name)
    }

    /// Accepted entries in proposal order.
    pub fn accepted(&self) -> impl Iterator<Item = &FileEntry> {
        self.proposal
            .files
            .iter()
            .filter(|f| self.accepted.contains(&f.name))
    }

    pub fn finalize(self) -> BatchDecision {
        BatchDecision::from_accepted(self.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[(&str, usize)]) -> Vec<FileDescriptor> {
        names
            .iter()
            .map(|(n, len)| FileDescriptor::from_bytes(*n, vec![7u8; *len]))
            .collect()
    }

    #[test]
    fn propose_rejects_empty_and_duplicates() {
        assert!(matches!(
            PendingBatch::propose(Vec::new()),
            Err(TransferError::InvalidBatch(_))
        ));
        assert!(matches!(
            PendingBatch::propose(files(&[("a.txt", 1), ("a.txt", 2)])),
            Err(TransferError::InvalidBatch(_))
        ));
    }

    #[test]
    fn proposal_lists_files_in_order() {
        let (pending, proposal) =
            PendingBatch::propose(files(&[("a.txt", 100), ("b.txt", 50)])).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(proposal.total_count, 2);
        assert_eq!(proposal.names().collect::<Vec<_>>(), vec!["a.txt", "b.txt"]);
        assert_eq!(proposal.total_bytes(), 150);
        validate_proposal(&proposal).unwrap();
    }

    #[test]
    fn resolve_keeps_original_order() {
        let (pending, _) =
            PendingBatch::propose(files(&[("c", 1), ("a", 1), ("b", 1), ("d", 1)])).unwrap();
        let decision = BatchDecision::from_accepted(["d", "c", "b"]);
        match pending.resolve(decision) {
            Resolution::Stream(accepted) => {
                let names: Vec<_> = accepted.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["c", "b", "d"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_names_resolve_to_nothing() {
        let (pending, _) = PendingBatch::propose(files(&[("a", 1)])).unwrap();
        assert!(matches!(
            pending.resolve(BatchDecision::from_accepted(["zzz"])),
            Resolution::NothingAccepted
        ));
    }

    #[test]
    fn empty_acceptance_is_denial() {
        assert_eq!(BatchDecision::from_accepted(Vec::<String>::new()), BatchDecision::Denied);
        assert_eq!(BatchDecision::Denied.into_message(), PeerMessage::PermissionDenied);
        let (pending, _) = PendingBatch::propose(files(&[("a", 1)])).unwrap();
        assert!(matches!(pending.resolve(BatchDecision::Denied), Resolution::Denied));
    }

    #[test]
    fn draft_emits_single_decision() {
        let (_, proposal) =
            PendingBatch::propose(files(&[("a.txt", 100), ("b.txt", 50)])).unwrap();
        let mut draft = DecisionDraft::new(proposal);
        assert!(!draft.accept("nope"));
        assert!(draft.toggle("a.txt"));
        assert!(draft.accept("b.txt"));
        assert!(!draft.toggle("a.txt"));
        assert_eq!(
            draft.accepted().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["b.txt"]
        );
        assert_eq!(
            draft.finalize().into_message(),
            PeerMessage::PermissionGranted(PermissionGrant {
                accepted_files: vec!["b.txt".into()],
            })
        );
    }

    #[test]
    fn draft_accept_all_then_reject_all() {
        let mut draft = DecisionDraft::new(BatchProposal::new(vec![
            FileEntry { name: "x".into(), size: 1 },
            FileEntry { name: "y".into(), size: 2 },
        ]));
        draft.accept_all();
        assert!(draft.is_accepted("x") && draft.is_accepted("y"));
        draft.reject_all();
        assert_eq!(draft.finalize(), BatchDecision::Denied);
    }

    #[test]
    fn malformed_proposals_are_violations() {
        let mut proposal = BatchProposal::new(vec![FileEntry { name: "x".into(), size: 1 }]);
        proposal.total_count = 3;
        assert!(matches!(
            validate_proposal(&proposal),
            Err(TransferError::ProtocolViolation(_))
        ));
        assert!(validate_proposal(&BatchProposal::new(Vec::new())).is_err());
    }
}
