// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::experiment::types::{Section, SectionItem, SectionKind, SignalUid};
use crate::parameter_resolver::ParameterResolver;
use crate::schedule::{CaseSchedule, Schedule};

use super::LoweringContext;

/// Lower a match section and its cases.
///
/// Cases without content become empty branches that occupy every signal of
/// the match. All cases share the timing grid of the match.
pub(super) fn lower_match(
    ctx: &LoweringContext,
    section: &Section,
    resolver: &ParameterResolver,
) -> Result<Schedule> {
    let mut cases: Vec<(CaseSchedule, bool)> = Vec::with_capacity(section.children.len());
    let mut states = BTreeSet::new();
    for child in section.children.iter() {
        let SectionItem::Section(case) = child else {
            return Err(Error::new(format!(
                "Match section '{}' may only contain case sections.",
                section.uid
            )));
        };
        let SectionKind::Case { state } = case.kind else {
            return Err(Error::new(format!(
                "Expected a case section in match section '{}', found '{}'.",
                section.uid, case.uid
            )));
        };
        if !states.insert(state) {
            return Err(Error::new(format!(
                "Match section '{}' has more than one case for state {state}.",
                section.uid
            )));
        }
        let children = ctx.lower_children(case, resolver)?;
        let is_empty = children.is_empty();
        let schedule = ctx.section_schedule(case, children)?;
        cases.push((CaseSchedule::from_section_schedule(schedule, state), is_empty));
    }

    let mut signals: BTreeSet<SignalUid> = cases
        .iter()
        .flat_map(|(case, _)| case.section.signals.iter().cloned())
        .collect();
    signals.extend(section.reserved_signals.iter().cloned());
    let mut match_schedule = ctx.section_schedule(section, vec![])?;
    match_schedule.signals = signals;
    match_schedule.grid = ctx.signal_grid(&match_schedule.signals);

    for (mut case, is_empty) in cases {
        case.section.grid = match_schedule.grid;
        if is_empty {
            case.section.signals = match_schedule.signals.clone();
            match_schedule.add_child(Schedule::EmptyBranch(case));
        } else {
            match_schedule.add_child(Schedule::Case(case));
        }
    }
    Ok(Schedule::Match(match_schedule))
}

#[cfg(test)]
mod tests {
    use crate::ParameterStoreBuilder;
    use crate::experiment::builders::{
        ExperimentBuilder, PlayPulseBuilder, SectionBuilder, SignalBuilder,
    };
    use crate::experiment::types::{Delay, DeviceKind};
    use crate::lower_experiment::lower_experiment;
    use crate::schedule::Schedule;

    #[test]
    fn test_empty_case_becomes_empty_branch() {
        let root = SectionBuilder::match_("match")
            .section(
                SectionBuilder::case("case_0", 0)
                    .operation(PlayPulseBuilder::new("drive", "x180", 64))
                    .build(),
            )
            .section(SectionBuilder::case("case_1", 1).build())
            .build();
        let experiment = ExperimentBuilder::new(root)
            .signal(SignalBuilder::new("drive", "shfsg", DeviceKind::Shfsg).build())
            .signal(SignalBuilder::new("flux", "hdawg", DeviceKind::Hdawg).build())
            .build();
        let store = ParameterStoreBuilder::new().build();
        let schedule = lower_experiment(&experiment, &store).unwrap().schedule;
        let Schedule::Match(m) = &schedule else {
            panic!("Expected match");
        };
        assert!(matches!(m.children[0].schedule.as_ref(), Schedule::Case(c) if c.state == 0));
        let Schedule::EmptyBranch(empty) = m.children[1].schedule.as_ref() else {
            panic!("Expected empty branch");
        };
        assert_eq!(empty.state, 1);
        assert_eq!(empty.section.signals, m.signals);
        assert_eq!(empty.section.grid, m.grid);
    }

    #[test]
    fn test_match_children_must_be_cases() {
        let root = SectionBuilder::match_("match")
            .operation(Delay::new("drive", 16))
            .build();
        let experiment = ExperimentBuilder::new(root)
            .signal(SignalBuilder::new("drive", "shfsg", DeviceKind::Shfsg).build())
            .build();
        let store = ParameterStoreBuilder::new().build();
        assert!(lower_experiment(&experiment, &store).is_err());

        let root = SectionBuilder::match_("match")
            .section(SectionBuilder::case("a", 0).build())
            .section(SectionBuilder::case("b", 0).build())
            .build();
        let experiment = ExperimentBuilder::new(root).build();
        assert!(lower_experiment(&experiment, &store).is_err());
    }
}
