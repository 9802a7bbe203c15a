//! Approval state machine
//!
//! `drafted -> pending -> {approved, rejected}`, `approved -> reimbursed`.
//! Each transition cascades to the report's expenses and notifies the owner.
//!
//! `decide` trusts its caller to have checked visibility. User approvers only
//! see reports whose owner sits on a strictly lower tier level, see
//! `is_visible_to` and `list_approvals`.

use tracing::info;

use crate::aggregator::{dedup_ids, summarize};
use crate::config::PolicyConfig;
use crate::db::{Database, ReportFilter};
use crate::error::{Error, Result};
use crate::models::{
    ActorRef, Approvers, DecisionAction, Page, Report, ReportStatus, ReportSummary, User,
    UserType,
};
use crate::notify::{self, NotificationSink};

pub struct ApprovalEngine<'a> {
    db: &'a Database,
    notifier: &'a dyn NotificationSink,
    config: &'a PolicyConfig,
}

impl<'a> ApprovalEngine<'a> {
    pub fn new(
        db: &'a Database,
        notifier: &'a dyn NotificationSink,
        config: &'a PolicyConfig,
    ) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    fn user(&self, id: i64) -> Result<User> {
        self.db
            .get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))
    }

    fn tier_level(&self, user: &User) -> Result<i64> {
        let tier_id = user
            .tier_id
            .ok_or_else(|| Error::NotFound(format!("User {} has no tier assigned", user.id)))?;
        let tier = self
            .db
            .get_tier(tier_id)?
            .ok_or_else(|| Error::NotFound(format!("Tier {} not found", tier_id)))?;
        Ok(tier.level)
    }

    /// Approve or reject a pending report
    ///
    /// Approval needs `expense_ids` to equal the report's expenses as a set.
    /// Rejection takes the non-empty subset to reject; the rest of the report is
    /// approved and the report itself ends `rejected`. Membership is checked
    /// inside the write transaction.
    pub fn decide(
        &self,
        report_id: i64,
        action: DecisionAction,
        expense_ids: &[i64],
        reason: Option<&str>,
        actor: ActorRef,
    ) -> Result<Report> {
        let supplied = dedup_ids(expense_ids);
        if supplied.is_empty() {
            return Err(Error::Validation("Expenses are required".into()));
        }

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let updated = self
            .db
            .apply_decision(report_id, action, &supplied, actor, reason)?;

        info!(
            report = %updated.report_id,
            action = action.as_str(),
            actor = %actor,
            expenses = supplied.len(),
            "Report decided"
        );
        notify::emit(self.notifier, &updated);

        Ok(updated)
    }

    /// Mark a report reimbursed by finance
    ///
    /// Allowed source states come from `PolicyConfig::reimbursable_statuses`;
    /// terminal reports are always refused.
    pub fn reimburse(&self, report_id: i64, actor: ActorRef, note: Option<&str>) -> Result<Report> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let updated = self.db.apply_reimbursement(
            report_id,
            actor,
            note,
            self.config.reimbursable_statuses(),
        )?;

        info!(report = %updated.report_id, actor = %actor, "Report reimbursed");
        notify::emit(self.notifier, &updated);

        Ok(updated)
    }

    /// Who approves reports for users on `tier_id`
    ///
    /// Approver-type users on any tier one level up, otherwise the active admins.
    pub fn get_approvers(&self, tier_id: i64) -> Result<Approvers> {
        let tier = self
            .db
            .get_tier(tier_id)?
            .ok_or_else(|| Error::NotFound(format!("Tier {} not found", tier_id)))?;

        let users = self.db.list_approvers_at_level(tier.level + 1)?;
        if !users.is_empty() {
            return Ok(Approvers::Users(users));
        }

        let admins = self.db.list_active_admins()?;
        if admins.is_empty() {
            return Err(Error::NotFound(format!(
                "No approver available for tier {}",
                tier.title
            )));
        }
        Ok(Approvers::Admins(admins))
    }

    /// Whether a user approver may see and decide on `report`
    pub fn is_visible_to(&self, approver_id: i64, report: &Report) -> Result<bool> {
        let approver = self.user(approver_id)?;
        if approver.user_type != UserType::Approver {
            return Ok(false);
        }
        let approver_level = self.tier_level(&approver)?;
        let owner = self.user(report.user_id)?;
        let owner_level = self.tier_level(&owner)?;
        Ok(owner_level < approver_level)
    }

    /// Reports awaiting or past review that a user approver can see
    pub fn list_approvals(
        &self,
        approver_id: i64,
        page: i64,
        status: Option<ReportStatus>,
    ) -> Result<Page<ReportSummary>> {
        let approver = self.user(approver_id)?;
        if approver.user_type != UserType::Approver {
            return Err(Error::Unauthorized("Only approvers can view approvals".into()));
        }
        let level = self.tier_level(&approver)?;

        let filter = ReportFilter::new()
            .owner_level_below(level)
            .status(status)
            .exclude_drafted(true);
        let (limit, offset) = self.config.page_window(page);
        let items = self
            .db
            .list_reports(&filter, limit, offset)?
            .into_iter()
            .map(|r| summarize(self.db, r))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page: page.max(1),
            total: self.db.count_reports(&filter)?,
        })
    }

    /// A user's reports for admin review, drafts hidden unless asked for
    pub fn list_user_reports(
        &self,
        user_id: i64,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportSummary>> {
        self.user(user_id)?;
        let filter = ReportFilter::new()
            .user_id(user_id)
            .status(status)
            .exclude_drafted(true);
        let total = self.db.count_reports(&filter)?;
        self.db
            .list_reports(&filter, total.max(1), 0)?
            .into_iter()
            .map(|r| summarize(self.db, r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ReportAggregator;
    use crate::error::{PolicyViolation, StateConflict};
    use crate::models::{ExpenseStatus, NewTier, NewUser, ReportMetadata, TierCategory};
    use crate::test_utils::{Fixture, RecordingSink};

    fn submit(fx: &Fixture, sink: &RecordingSink, ids: &[i64]) -> Report {
        let config = PolicyConfig::default();
        ReportAggregator::new(&fx.db, sink, &config)
            .submit_report(
                fx.submitter,
                ids,
                &ReportMetadata {
                    title: "Conference".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .report
    }

    fn three_expenses(fx: &Fixture) -> (i64, i64, i64) {
        (
            fx.expense(fx.submitter, "A", "food", "10").id,
            fx.expense(fx.submitter, "B", "food", "20").id,
            fx.expense(fx.submitter, "C", "travel", "30").id,
        )
    }

    fn status_of(fx: &Fixture, id: i64) -> ExpenseStatus {
        fx.db.get_expense(id).unwrap().unwrap().status
    }

    #[test]
    fn test_approve_requires_full_set() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, c) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b, c]);
        let actor = ActorRef::user(fx.approver);

        let err = engine
            .decide(report.id, DecisionAction::Approve, &[a, b], None, actor)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(StateConflict::ExpenseSetMismatch)
        ));
        assert_eq!(err.to_string(), "Expenses do not match");

        let approved = engine
            .decide(
                report.id,
                DecisionAction::Approve,
                &[c, a, b],
                Some("Looks good"),
                actor,
            )
            .unwrap();

        assert_eq!(approved.status, ReportStatus::Approved);
        assert_eq!(approved.approver, Some(actor));
        assert_eq!(approved.reasons, vec!["Looks good".to_string()]);
        for id in [a, b, c] {
            assert_eq!(status_of(&fx, id), ExpenseStatus::Approved);
        }
    }

    #[test]
    fn test_reject_subset_approves_complement() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, c) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b, c]);

        let rejected = engine
            .decide(
                report.id,
                DecisionAction::Reject,
                &[b],
                Some("No receipt for B"),
                ActorRef::admin(fx.admin),
            )
            .unwrap();

        assert_eq!(rejected.status, ReportStatus::Rejected);
        assert_eq!(rejected.approver, Some(ActorRef::admin(fx.admin)));
        assert_eq!(status_of(&fx, a), ExpenseStatus::Approved);
        assert_eq!(status_of(&fx, b), ExpenseStatus::Rejected);
        assert_eq!(status_of(&fx, c), ExpenseStatus::Approved);
    }

    #[test]
    fn test_reject_subset_must_belong_to_report() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, c) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b]);

        let err = engine
            .decide(
                report.id,
                DecisionAction::Reject,
                &[c],
                None,
                ActorRef::admin(fx.admin),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(StateConflict::ExpenseSetMismatch)
        ));
        assert_eq!(status_of(&fx, a), ExpenseStatus::Mapped);
    }

    #[test]
    fn test_second_decision_is_already_decided() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, c) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b, c]);
        let actor = ActorRef::user(fx.approver);

        engine
            .decide(report.id, DecisionAction::Approve, &[a, b, c], None, actor)
            .unwrap();
        let before = sink.sent().len();

        let err = engine
            .decide(report.id, DecisionAction::Approve, &[a, b, c], None, actor)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(StateConflict::AlreadyDecided(ReportStatus::Approved))
        ));
        // No second notification
        assert_eq!(sink.sent().len(), before);
    }

    #[test]
    fn test_decision_notifies_owner() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, _, _) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a]);

        engine
            .decide(
                report.id,
                DecisionAction::Reject,
                &[a],
                None,
                ActorRef::user(fx.approver),
            )
            .unwrap();

        let last = sink.sent().pop().unwrap();
        assert_eq!(last.user_id, fx.submitter);
        assert_eq!(last.status, ReportStatus::Rejected);
        assert_eq!(last.report_id, report.id);
    }

    #[test]
    fn test_reimburse_requires_approval_by_default() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, _, _) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a]);
        let finance = ActorRef::admin(fx.admin);

        let err = engine.reimburse(report.id, finance, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(StateConflict::NotApproved(ReportStatus::Pending))
        ));

        engine
            .decide(report.id, DecisionAction::Approve, &[a], None, finance)
            .unwrap();
        let paid = engine
            .reimburse(report.id, finance, Some("Paid via NEFT"))
            .unwrap();

        assert_eq!(paid.status, ReportStatus::Reimbursed);
        assert_eq!(paid.reimburser, Some(finance));
        assert_eq!(paid.description_finance.as_deref(), Some("Paid via NEFT"));
        assert_eq!(sink.sent().last().unwrap().status, ReportStatus::Reimbursed);

        let again = engine.reimburse(report.id, finance, None).unwrap_err();
        assert!(matches!(
            again,
            Error::Conflict(StateConflict::AlreadyDecided(ReportStatus::Reimbursed))
        ));
    }

    #[test]
    fn test_finance_override_reimburses_pending() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig {
            reimburse_requires_approval: false,
            ..Default::default()
        };
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, _) = three_expenses(&fx);
        let pending = submit(&fx, &sink, &[a]);
        let rejected = submit(&fx, &sink, &[b]);
        let finance = ActorRef::admin(fx.admin);

        assert_eq!(
            engine.reimburse(pending.id, finance, None).unwrap().status,
            ReportStatus::Reimbursed
        );

        engine
            .decide(rejected.id, DecisionAction::Reject, &[b], None, finance)
            .unwrap();
        assert!(matches!(
            engine.reimburse(rejected.id, finance, None),
            Err(Error::Conflict(StateConflict::AlreadyDecided(
                ReportStatus::Rejected
            )))
        ));
    }

    #[test]
    fn test_decision_requires_expenses() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, _) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b]);
        let actor = ActorRef::user(fx.approver);

        for action in [DecisionAction::Approve, DecisionAction::Reject] {
            let err = engine
                .decide(report.id, action, &[], None, actor)
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert_eq!(err.to_string(), "Expenses are required");
        }

        assert_eq!(
            fx.db.get_report(report.id).unwrap().unwrap().status,
            ReportStatus::Pending
        );
        assert_eq!(status_of(&fx, a), ExpenseStatus::Mapped);
        assert!(sink.sent().iter().all(|n| n.status == ReportStatus::Pending));
    }

    #[test]
    fn test_decision_uses_current_membership() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, c) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a, b]);

        // Owner swaps B for C after the approver loaded the report
        let mut edited = fx.db.get_report(report.id).unwrap().unwrap();
        edited.expense_ids = vec![a, c];
        let added = fx.db.get_expense(c).unwrap().unwrap();
        fx.db
            .apply_report_update(&edited, &[added], &[b], ExpenseStatus::Draft)
            .unwrap();

        let actor = ActorRef::user(fx.approver);
        let err = engine
            .decide(report.id, DecisionAction::Approve, &[a, b], None, actor)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(StateConflict::ExpenseSetMismatch)
        ));
        assert_eq!(status_of(&fx, b), ExpenseStatus::Draft);

        let approved = engine
            .decide(report.id, DecisionAction::Approve, &[a, c], None, actor)
            .unwrap();
        assert_eq!(approved.status, ReportStatus::Approved);
        assert_eq!(status_of(&fx, c), ExpenseStatus::Approved);
    }

    #[test]
    fn test_finance_override_settles_expenses() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig {
            reimburse_requires_approval: false,
            ..Default::default()
        };
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, _) = three_expenses(&fx);
        let pending = submit(&fx, &sink, &[a, b]);

        engine
            .reimburse(pending.id, ActorRef::admin(fx.admin), None)
            .unwrap();
        assert_eq!(status_of(&fx, a), ExpenseStatus::Approved);
        assert_eq!(status_of(&fx, b), ExpenseStatus::Approved);

        let err = ReportAggregator::new(&fx.db, &sink, &config)
            .submit_report(
                fx.submitter,
                &[a],
                &ReportMetadata {
                    title: "Again".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Policy(PolicyViolation::CrossReportConflict(ref title)) if title == "Conference"
        ));
    }

    #[test]
    fn test_terminal_reports_refuse_decisions() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, _, _) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a]);
        let finance = ActorRef::admin(fx.admin);

        engine
            .decide(report.id, DecisionAction::Reject, &[a], None, finance)
            .unwrap();

        for action in [DecisionAction::Approve, DecisionAction::Reject] {
            assert!(matches!(
                engine.decide(report.id, action, &[a], None, finance),
                Err(Error::Conflict(StateConflict::AlreadyDecided(_)))
            ));
        }
    }

    #[test]
    fn test_approvers_one_level_up() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);

        match engine.get_approvers(fx.associate_tier).unwrap() {
            Approvers::Users(users) => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].id, fx.approver);
            }
            other => panic!("expected user approvers, got {:?}", other),
        }
    }

    #[test]
    fn test_approvers_span_tiers_at_next_level() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);

        // Two level-4 tiers; only the later one has an approver
        let first = fx
            .db
            .create_tier(&NewTier::new("Director", 4, vec![]))
            .unwrap();
        let second = fx
            .db
            .create_tier(&NewTier::new("Principal", 4, vec![]))
            .unwrap();
        fx.db
            .create_user(&NewUser {
                name: "Dana".into(),
                tier_id: Some(first),
                ..Default::default()
            })
            .unwrap();
        let pat = fx
            .db
            .create_user(&NewUser {
                name: "Pat".into(),
                user_type: UserType::Approver,
                tier_id: Some(second),
                ..Default::default()
            })
            .unwrap();

        match engine.get_approvers(fx.manager_tier).unwrap() {
            Approvers::Users(users) => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].id, pat);
            }
            other => panic!("expected user approvers, got {:?}", other),
        }
    }

    #[test]
    fn test_approvers_fall_back_to_admins() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);

        // Nobody sits at level 4
        match engine.get_approvers(fx.manager_tier).unwrap() {
            Approvers::Admins(admins) => assert_eq!(admins[0].id, fx.admin),
            other => panic!("expected admins, got {:?}", other),
        }

        // A level-4 tier without approver-type users still falls back
        let director = fx
            .db
            .create_tier(&NewTier::new(
                "Director",
                4,
                vec![TierCategory::new("food", "1".parse().unwrap(), true)],
            ))
            .unwrap();
        fx.db
            .create_user(&NewUser {
                name: "Dana".into(),
                tier_id: Some(director),
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            engine.get_approvers(fx.manager_tier).unwrap(),
            Approvers::Admins(_)
        ));
    }

    #[test]
    fn test_visibility_by_tier_level() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, _, _) = three_expenses(&fx);
        let report = submit(&fx, &sink, &[a]);

        assert!(engine.is_visible_to(fx.approver, &report).unwrap());
        // Submitters never approve
        assert!(!engine.is_visible_to(fx.submitter, &report).unwrap());

        let page = engine.list_approvals(fx.approver, 1, None).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, report.id);

        assert!(matches!(
            engine.list_approvals(fx.submitter, 1, None),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_peer_reports_are_hidden() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);

        // Another approver on the same level-3 tier
        let peer = fx
            .db
            .create_user(&NewUser {
                name: "Pat Peer".into(),
                user_type: UserType::Approver,
                tier_id: Some(fx.manager_tier),
                ..Default::default()
            })
            .unwrap();
        let expense = fx.expense(peer, "Peer lunch", "food", "10");
        let report = ReportAggregator::new(&fx.db, &sink, &config)
            .submit_report(
                peer,
                &[expense.id],
                &ReportMetadata {
                    title: "Peer".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .report;

        assert!(!engine.is_visible_to(fx.approver, &report).unwrap());
        assert_eq!(engine.list_approvals(fx.approver, 1, None).unwrap().total, 0);
    }

    #[test]
    fn test_list_user_reports_hides_drafts() {
        let fx = Fixture::new();
        let sink = RecordingSink::default();
        let config = PolicyConfig::default();
        let engine = ApprovalEngine::new(&fx.db, &sink, &config);
        let (a, b, _) = three_expenses(&fx);
        submit(&fx, &sink, &[a]);
        ReportAggregator::new(&fx.db, &sink, &config)
            .submit_report(
                fx.submitter,
                &[b],
                &ReportMetadata {
                    title: "Draft".into(),
                    draft: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(engine.list_user_reports(fx.submitter, None).unwrap().len(), 1);
        let drafts = engine
            .list_user_reports(fx.submitter, Some(ReportStatus::Drafted))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Draft");
    }
}
