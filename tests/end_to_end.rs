use std::fs;

use treestyle::export::{export, ExportError, ExportFormat, ExportOptions};
use treestyle::newick::{parse_tree, to_newick};
use treestyle::project::{self, ProjectError};
use treestyle::render::{draw_tree, DrawOptions, SceneBuilder};
use treestyle::style::{BranchDecorationStyle, CladeLabel, Color, DecorationShape};

const SCENARIO: &str =
    "(A:2,((BAA:5,BAB:3)20/30:1,((BBAA:2,BBAB:1)85/95:1,BBB:3)100/100:2)30/45:2,C:1);";

#[test]
fn parse_style_save_load_export() {
    let mut tree = parse_tree(SCENARIO).unwrap();
    let root = tree.root();
    assert_eq!(tree[root].children().len(), 3);
    assert_eq!(to_newick(&tree), SCENARIO);

    let b = tree[root].children()[1];
    tree[b].style.branch_color = Some(Color::from_rgb(0, 120, 200));
    tree[b].style.label = Some(CladeLabel::new("Clade B", Color::BLACK));
    tree.style.show_node_values = true;
    tree.style.decorations.push(BranchDecorationStyle::new(
        Some("^100"),
        DecorationShape::ClosedCircle,
        6.0,
        Color::from_rgb(200, 0, 0),
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.tsp");
    project::save_file(&path, &[tree.clone()]).unwrap();
    let loaded = project::load_file(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    let back = &loaded[0];

    let styles: Vec<_> = tree.all_clades().map(|id| tree[id].style.clone()).collect();
    let back_styles: Vec<_> = back.all_clades().map(|id| back[id].style.clone()).collect();
    assert_eq!(styles, back_styles);
    assert_eq!(back.style, tree.style);

    let mut svg: Vec<u8> = Vec::new();
    export(
        ExportFormat::Svg,
        Some(back),
        Some(&mut svg),
        Some(&ExportOptions::default()),
    )
    .unwrap();
    let svg = String::from_utf8(svg).unwrap();
    assert!(svg.contains("Clade B"));
    assert!(svg.contains("#0078c8"));

    let mut builder = SceneBuilder::new(Color::WHITE);
    draw_tree(back, &DrawOptions::default(), &mut builder).unwrap();
    let scene = builder.into_scene().unwrap();
    let decorated: Vec<_> = scene
        .group("decorations")
        .unwrap()
        .items
        .iter()
        .map(|item| item.id.clone())
        .collect();
    assert_eq!(decorated.len(), 1);
    assert!(decorated[0].ends_with("-0"));
}

#[test]
fn deep_clone_is_independent() {
    let tree = parse_tree(SCENARIO).unwrap();
    let mut copy = tree.clone();
    let leaf = copy.leaves().next().unwrap();
    copy[leaf].style.collapsed = true;
    copy[leaf].name = Some("renamed".into());

    assert!(!tree[leaf].style.collapsed);
    assert_eq!(tree[leaf].name.as_deref(), Some("A"));
}

#[test]
fn version_mismatch_constructs_no_trees() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let json = r#"{"version":"0","payload":{"trees":[
        {"treeText":"(A","treeStyle":{},"cladeStyles":[]}
    ]}}"#;
    encoder.write_all(json.as_bytes()).unwrap();
    let bytes = encoder.finish().unwrap();

    assert!(matches!(
        project::load(bytes.as_slice()),
        Err(ProjectError::UnsupportedVersion { .. })
    ));
}

#[test]
fn export_to_files_in_every_format() {
    let tree = parse_tree(SCENARIO).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let options = ExportOptions::default();

    for format in [ExportFormat::Svg, ExportFormat::Png, ExportFormat::Pdf] {
        let path = dir.path().join(format!("tree.{}", format.extension()));
        let mut file = fs::File::create(&path).unwrap();
        export(format, Some(&tree), Some(&mut file), Some(&options)).unwrap();
        drop(file);
        assert!(fs::metadata(&path).unwrap().len() > 100, "{format} output too small");
    }

    let err = export(ExportFormat::Png, Some(&tree), None, None).unwrap_err();
    assert!(matches!(err, ExportError::MissingArgument("sink")));
}

#[test]
fn deep_caterpillar_survives_every_stage() {
    let depth = 20_000;
    let mut text = "(".repeat(depth);
    text.push_str("A:1");
    for i in 0..depth {
        text.push_str(&format!(",T{i}:1):1"));
    }
    text.push(';');

    let mut tree = parse_tree(&text).unwrap();
    assert_eq!(to_newick(&tree), text);

    let layout = treestyle::tree::layout::TreeLayout::rectangular(&tree, 1.0);
    assert_eq!(layout.slots, depth + 1);
    assert!((layout.width - (depth as f32 + 1.0)).abs() < 1e-3);

    let mut builder = SceneBuilder::new(Color::WHITE);
    draw_tree(&tree, &DrawOptions::default(), &mut builder).unwrap();
    let scene = builder.into_scene().unwrap();
    assert_eq!(scene.clades.len(), 2 * depth + 1);

    tree.ladderize(true);
    tree.rotate(tree.root());
    let mut bytes = Vec::new();
    project::save(&mut bytes, &[tree.clone()]).unwrap();
    let loaded = project::load(bytes.as_slice()).unwrap();
    assert_eq!(to_newick(&loaded[0]), to_newick(&tree));
}
