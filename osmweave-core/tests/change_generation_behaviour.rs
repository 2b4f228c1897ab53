//! Behavioural tests for generating change sets from a source layer.

use geo::Coord;
use osmweave_core::{
    Action, ChangeError, ChangeGenerator, ChangeOutcome, Element, ElementId, ElementKind, ElementRef, GeneratorConfig,
    GroupingObject, IdentifierMode, LinearFeature, Member, Point, SourceGeometry, SourceRecord, SourceVertex, Tags,
    test_support::MemorySource,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

type Outcome = RefCell<Option<Result<ChangeOutcome, ChangeError>>>;

#[fixture]
fn source() -> RefCell<MemorySource> {
    RefCell::new(MemorySource::default())
}

#[fixture]
fn config() -> RefCell<GeneratorConfig> {
    RefCell::new(GeneratorConfig::default())
}

#[fixture]
fn outcome() -> Outcome {
    RefCell::new(None)
}

fn publish_trail(source: &mut MemorySource, id: ElementId, points: &[(ElementId, f64, f64)]) -> SourceRecord {
    for (node, x, y) in points {
        source.add_point(Point::new(*node, Coord { x: *x, y: *y }, Tags::new()));
    }
    let nodes = points.iter().map(|(node, _, _)| *node).collect();
    source.add_linear(LinearFeature::new(id, nodes, Tags::new()).expect("valid trail"));
    SourceRecord::new(SourceGeometry::Line(
        points
            .iter()
            .map(|(node, x, y)| SourceVertex::existing(*node, Coord { x: *x, y: *y }))
            .collect(),
    ))
    .with_id(id)
}

fn imported_trail(points: &[(f64, f64)]) -> SourceRecord {
    SourceRecord::new(SourceGeometry::Line(
        points
            .iter()
            .map(|(x, y)| SourceVertex::new(Coord { x: *x, y: *y }))
            .collect(),
    ))
}

fn expect_outcome(outcome: &Outcome) -> ChangeOutcome {
    outcome
        .borrow()
        .as_ref()
        .expect("generation attempted")
        .as_ref()
        .expect("generation succeeded")
        .clone()
}

fn created_trails(outcome: &ChangeOutcome) -> Vec<Vec<ElementId>> {
    outcome
        .changes
        .elements(Action::Create, ElementKind::Linear)
        .filter_map(|element| match element {
            Element::Linear(line) => Some(line.nodes.clone()),
            _ => None,
        })
        .collect()
}

#[given("published trails 1 and 2 crossing at 1,1")]
fn given_crossing_trails(#[from(source)] source: &RefCell<MemorySource>) {
    let mut source = source.borrow_mut();
    let first = publish_trail(&mut source, 1, &[(11, 0.0, 0.0), (12, 2.0, 2.0)]);
    let second = publish_trail(&mut source, 2, &[(21, 0.0, 2.0), (22, 2.0, 0.0)]);
    source.add_layer("trails", 4326, [first, second]);
}

#[given("an imported trail through 0,0 and 1,1 and 2,2")]
fn given_imported_trail(#[from(source)] source: &RefCell<MemorySource>) {
    let record = imported_trail(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
    source.borrow_mut().add_layer("trails", 4326, [record]);
}

#[given("an imported trail with a single distinct point")]
fn given_degenerate_trail(#[from(source)] source: &RefCell<MemorySource>) {
    let record = imported_trail(&[(3.0, 3.0), (3.0, 3.0)]);
    source.borrow_mut().add_layer("trails", 4326, [record]);
}

#[given("published trail 10 through 0,0 and 1,1 and 2,2")]
fn given_published_trail(#[from(source)] source: &RefCell<MemorySource>) {
    let mut source = source.borrow_mut();
    let record = publish_trail(&mut source, 10, &[(1, 0.0, 0.0), (2, 1.0, 1.0), (3, 2.0, 2.0)]);
    source.add_layer("trails", 4326, [record]);
}

#[given("relation 1 lists trail 10 as outer and trail 11 as inner")]
fn given_relation(#[from(source)] source: &RefCell<MemorySource>) {
    source.borrow_mut().add_relation(GroupingObject::new(
        1,
        vec![
            Member::new(ElementKind::Linear, 10, "outer"),
            Member::new(ElementKind::Linear, 11, "inner"),
        ],
        Tags::new(),
        1,
    ));
}

#[given("crossings between trails are detected")]
fn given_self_intersections(#[from(config)] config: &RefCell<GeneratorConfig>) {
    config.borrow_mut().self_intersections = true;
}

#[given("features are limited to 2 points")]
fn given_point_limit(#[from(config)] config: &RefCell<GeneratorConfig>) {
    config.borrow_mut().max_points_per_feature = Some(2);
}

#[given("confirmed identifiers start at 101")]
fn given_confirmed_ids(#[from(config)] config: &RefCell<GeneratorConfig>) {
    let mut config = config.borrow_mut();
    config.identifier_mode = IdentifierMode::Confirmed;
    config.id_offset = 101;
}

#[when("changes are generated for the trails layer")]
fn when_generate(
    #[from(source)] source: &RefCell<MemorySource>,
    #[from(config)] config: &RefCell<GeneratorConfig>,
    #[from(outcome)] outcome: &Outcome,
) {
    let source = source.borrow();
    let generator = ChangeGenerator::new(&*source, &*source).with_config(config.borrow().clone());
    *outcome.borrow_mut() = Some(generator.generate_changes("trails"));
}

#[then("one intersection is reported")]
fn then_one_intersection(#[from(outcome)] outcome: &Outcome) {
    assert_eq!(expect_outcome(outcome).stats.crossings, 1);
}

#[then("trails 1 and 2 are deleted")]
fn then_originals_deleted(#[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    assert_eq!(
        outcome.changes.refs(Action::Delete),
        vec![ElementRef::linear(1), ElementRef::linear(2)]
    );
}

#[then("four child trails are created around one new point")]
fn then_children_share_point(#[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    let points: Vec<ElementId> = outcome
        .changes
        .elements(Action::Create, ElementKind::Point)
        .map(Element::id)
        .collect();
    let [shared] = points.as_slice() else {
        panic!("expected exactly one new point, found {points:?}");
    };
    assert!(*shared < 0, "new points use provisional identifiers");
    assert_eq!(
        created_trails(&outcome),
        vec![
            vec![11, *shared],
            vec![*shared, 12],
            vec![21, *shared],
            vec![*shared, 22],
        ]
    );
}

#[then("two trails are created that share the middle point")]
fn then_split_at_limit(#[from(outcome)] outcome: &Outcome) {
    let trails = created_trails(&expect_outcome(outcome));
    let [first, second] = trails.as_slice() else {
        panic!("expected two trails, found {trails:?}");
    };
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first.last(), second.first());
}

#[then("no intersection points are created")]
fn then_no_new_points(#[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    assert_eq!(outcome.stats.created_points, 0);
    assert_eq!(
        outcome
            .changes
            .elements(Action::Create, ElementKind::Point)
            .count(),
        3,
        "only the imported vertices are created"
    );
}

#[then("relation 1 lists trails 101 and 102 as outer before trail 11 as inner")]
fn then_relation_rewritten(#[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    let Some(Element::Grouping(relation)) = outcome.changes.get(ElementRef::grouping(1)) else {
        panic!("relation 1 was not modified");
    };
    assert_eq!(
        relation.members,
        vec![
            Member::new(ElementKind::Linear, 101, "outer"),
            Member::new(ElementKind::Linear, 102, "outer"),
            Member::new(ElementKind::Linear, 11, "inner"),
        ]
    );
}

#[then("relation 1 is at version 2")]
fn then_relation_version(#[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    let version = outcome
        .changes
        .get(ElementRef::grouping(1))
        .map(Element::version);
    assert_eq!(version, Some(2));
}

#[then("the run fails with a malformed geometry error")]
fn then_malformed(#[from(outcome)] outcome: &Outcome) {
    let guard = outcome.borrow();
    let result = guard.as_ref().expect("generation attempted");
    assert!(
        matches!(result, Err(ChangeError::MalformedGeometry { points: 1, .. })),
        "unexpected result: {result:?}"
    );
}

#[then("a deletion pass over the unchanged layer deletes nothing")]
fn then_nothing_deleted(#[from(source)] source: &RefCell<MemorySource>, #[from(outcome)] outcome: &Outcome) {
    let outcome = expect_outcome(outcome);
    assert_eq!(outcome.exported.len(), 2);
    let source = source.borrow();
    let generator = ChangeGenerator::new(&*source, &*source);
    let current = generator.current_keys("trails").expect("layer exists");
    let changes = generator
        .generate_deletions(&outcome.exported, &current)
        .expect("deletion pass succeeds");
    assert!(changes.is_empty(), "unchanged layer deleted {:?}", changes.refs(Action::Delete));
}

#[scenario(path = "tests/features/change_generation.feature", index = 0)]
fn scenario_crossing_trails(source: RefCell<MemorySource>, config: RefCell<GeneratorConfig>, outcome: Outcome) {
    let _ = (source, config, outcome);
}

#[scenario(path = "tests/features/change_generation.feature", index = 1)]
fn scenario_point_limit(source: RefCell<MemorySource>, config: RefCell<GeneratorConfig>, outcome: Outcome) {
    let _ = (source, config, outcome);
}

#[scenario(path = "tests/features/change_generation.feature", index = 2)]
fn scenario_relation_follows_split(source: RefCell<MemorySource>, config: RefCell<GeneratorConfig>, outcome: Outcome) {
    let _ = (source, config, outcome);
}

#[scenario(path = "tests/features/change_generation.feature", index = 3)]
fn scenario_malformed_trail(source: RefCell<MemorySource>, config: RefCell<GeneratorConfig>, outcome: Outcome) {
    let _ = (source, config, outcome);
}

#[scenario(path = "tests/features/change_generation.feature", index = 4)]
fn scenario_split_children_survive_deletion(
    source: RefCell<MemorySource>,
    config: RefCell<GeneratorConfig>,
    outcome: Outcome,
) {
    let _ = (source, config, outcome);
}
