//! Filter projection over the report collection.
//!
//! Counts are always global: they reflect every report of a category, not
//! just the ones the current selection shows.

use std::collections::BTreeMap;

use relief_map_report_models::{FilterSet, FilterType, Report, Route};

use crate::{AppAction, AppState};

/// Returns the selection after the user clicks `clicked`.
///
/// Clicking `All` selects only `All`. Clicking a category removes `All`,
/// then toggles the category; removing the last category reverts to `All`.
#[must_use]
pub fn toggle_filter(active: &FilterSet, clicked: FilterType) -> FilterSet {
    if clicked == FilterType::All {
        return FilterSet::all();
    }

    let mut remaining: Vec<FilterType> = active.iter().filter(|f| *f != FilterType::All).collect();

    if remaining.contains(&clicked) {
        remaining.retain(|f| *f != clicked);
    } else {
        remaining.push(clicked);
    }

    FilterSet::new(remaining)
}

/// Returns `true` if `report` passes the selection.
#[must_use]
pub fn is_visible(active: &FilterSet, report: &Report) -> bool {
    active.is_all() || active.contains(FilterType::from(report.report_type))
}

/// The reports the current selection shows, in list order.
#[must_use]
pub fn visible_reports(state: &AppState) -> Vec<&Report> {
    state
        .reports
        .iter()
        .filter(|report| is_visible(&state.active_filters, report))
        .collect()
}

/// Number of reports in a category; `All` counts every report.
#[must_use]
pub fn category_count(reports: &[Report], filter: FilterType) -> usize {
    match filter.report_type() {
        None => reports.len(),
        Some(report_type) => reports
            .iter()
            .filter(|report| report.report_type == report_type)
            .count(),
    }
}

/// Counts for every filter chip, `All` included.
#[must_use]
pub fn category_counts(reports: &[Report]) -> BTreeMap<FilterType, usize> {
    FilterType::all()
        .iter()
        .map(|filter| (*filter, category_count(reports, *filter)))
        .collect()
}

/// Whether a filter chip should render as selected.
#[must_use]
pub fn is_filter_active(active: &FilterSet, filter: FilterType) -> bool {
    if filter == FilterType::All {
        active.is_all()
    } else {
        active.contains(filter) && !active.is_all()
    }
}

/// Actions for a filter chip click.
///
/// Besides updating the selection, clicking a category jumps the map to
/// the first report of that category (if any) and returns to the map
/// screen.
#[must_use]
pub fn toggle_filter_actions(state: &AppState, clicked: FilterType) -> Vec<AppAction> {
    let mut actions = vec![AppAction::SetFilters(toggle_filter(
        &state.active_filters,
        clicked,
    ))];

    if let Some(report_type) = clicked.report_type()
        && let Some(first) = state
            .reports
            .iter()
            .find(|report| report.report_type == report_type)
    {
        actions.push(AppAction::SetMapCenter(Some(first.location.position())));
        actions.push(AppAction::SetRoute(Route::Home));
    }

    actions
}

#[cfg(test)]
mod tests {
    use relief_map_report_models::{LatLng, ReportType};

    use super::*;
    use crate::{reduce, reduce_all};
    use crate::test_support::report;

    fn assert_invariant(set: &FilterSet) {
        assert!(!set.as_slice().is_empty(), "empty selection");
        if set.contains(FilterType::All) {
            assert_eq!(set.len(), 1, "All alongside other filters: {set:?}");
        }
        for (i, filter) in set.iter().enumerate() {
            assert!(!set.as_slice()[i + 1..].contains(&filter), "duplicate {filter:?}");
        }
    }

    /// Every sequence of exactly `len` filters.
    fn sequences(len: usize) -> Vec<Vec<FilterType>> {
        (0..len).fold(vec![Vec::new()], |prefixes, _| {
            prefixes
                .iter()
                .flat_map(|prefix| {
                    FilterType::all().iter().map(move |filter| {
                        let mut next = prefix.clone();
                        next.push(*filter);
                        next
                    })
                })
                .collect()
        })
    }

    #[test]
    fn every_short_toggle_sequence_keeps_invariant() {
        for len in 0..=4 {
            for clicks in sequences(len) {
                let mut set = FilterSet::all();
                for click in &clicks {
                    set = toggle_filter(&set, *click);
                    assert_invariant(&set);
                }
                if clicks.last() == Some(&FilterType::All) {
                    assert!(set.is_all(), "{clicks:?} ended in {set:?}");
                }
            }
        }
    }

    #[test]
    fn set_filters_normalizes_arbitrary_input() {
        for len in 0..=4 {
            for filters in sequences(len) {
                let expect_all = filters.is_empty() || filters.contains(&FilterType::All);
                let state = reduce(
                    &AppState::default(),
                    AppAction::SetFilters(FilterSet::from(filters.clone())),
                );
                assert_invariant(&state.active_filters);
                assert_eq!(state.active_filters.is_all(), expect_all, "{filters:?}");
                if !expect_all {
                    assert!(filters.iter().all(|f| state.active_filters.contains(*f)));
                }
            }
        }
    }

    #[test]
    fn toggle_sequences_keep_invariant() {
        let clicks = [
            FilterType::Medical,
            FilterType::SafeZone,
            FilterType::Medical,
            FilterType::All,
            FilterType::Volunteer,
            FilterType::Volunteer,
            FilterType::Resources,
            FilterType::HelpNeeded,
            FilterType::All,
            FilterType::All,
        ];
        let mut set = FilterSet::all();
        for click in clicks {
            set = toggle_filter(&set, click);
            assert_invariant(&set);
        }
        assert!(set.is_all());
    }

    #[test]
    fn selecting_category_drops_all() {
        let set = toggle_filter(&FilterSet::all(), FilterType::Medical);
        assert_eq!(set.as_slice(), &[FilterType::Medical]);

        let set = toggle_filter(&set, FilterType::SafeZone);
        assert_eq!(set.as_slice(), &[FilterType::Medical, FilterType::SafeZone]);
    }

    #[test]
    fn toggling_off_last_filter_reverts_to_all() {
        let set = FilterSet::new([FilterType::Medical]);
        assert_eq!(toggle_filter(&set, FilterType::Medical), FilterSet::all());
    }

    #[test]
    fn clicking_all_clears_others() {
        let set = FilterSet::new([FilterType::Medical, FilterType::Resources]);
        assert_eq!(toggle_filter(&set, FilterType::All), FilterSet::all());
    }

    #[test]
    fn projection_and_global_counts() {
        let state = AppState {
            reports: vec![
                report("1", ReportType::Medical),
                report("2", ReportType::HelpNeeded),
                report("3", ReportType::Medical),
            ],
            active_filters: FilterSet::new([FilterType::Medical]),
            ..AppState::default()
        };

        assert_eq!(visible_reports(&state).len(), 2);

        let counts = category_counts(&state.reports);
        assert_eq!(counts[&FilterType::All], 3);
        assert_eq!(counts[&FilterType::Medical], 2);
        assert_eq!(counts[&FilterType::HelpNeeded], 1);
        assert_eq!(counts[&FilterType::SafeZone], 0);
    }

    #[test]
    fn all_shows_everything() {
        let state = AppState {
            reports: vec![
                report("1", ReportType::Volunteer),
                report("2", ReportType::SafeZone),
            ],
            ..AppState::default()
        };
        assert_eq!(visible_reports(&state).len(), 2);
    }

    #[test]
    fn chip_highlight_rule() {
        let all = FilterSet::all();
        assert!(is_filter_active(&all, FilterType::All));
        assert!(!is_filter_active(&all, FilterType::Medical));

        let medical = FilterSet::new([FilterType::Medical]);
        assert!(is_filter_active(&medical, FilterType::Medical));
        assert!(!is_filter_active(&medical, FilterType::All));
    }

    #[test]
    fn clicking_category_centers_on_first_report() {
        let mut shelter = report("s1", ReportType::SafeZone);
        shelter.location.lat = 10.0;
        shelter.location.lng = 20.0;
        let state = AppState {
            reports: vec![report("m1", ReportType::Medical), shelter],
            route: Route::Alerts,
            ..AppState::default()
        };

        let next = reduce_all(&state, toggle_filter_actions(&state, FilterType::SafeZone));
        assert_eq!(next.active_filters.as_slice(), &[FilterType::SafeZone]);
        assert_eq!(next.map_center, Some(LatLng::new(10.0, 20.0)));
        assert_eq!(next.route, Route::Home);
    }

    #[test]
    fn clicking_empty_category_only_filters() {
        let state = AppState::default();
        let actions = toggle_filter_actions(&state, FilterType::Resources);
        assert_eq!(actions.len(), 1);
    }
}
