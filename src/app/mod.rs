use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use crate::export::{self, ExportFormat, ExportOptions, RasterOptions};
use crate::io::{self, TreeBundle};
use crate::project;
use crate::render::{BranchColouring, DrawOptions};
use crate::tree::Tree;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "treestyle",
    about = "Load phylogenetic trees, apply styles and export figures or project files."
)]
pub struct AppConfig {
    /// Tree file to load (Newick text or a project file).
    #[arg(value_name = "TREE_FILE")]
    pub tree_path: PathBuf,

    /// Export the selected tree to this path.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Export format; inferred from the output extension when omitted.
    #[arg(long)]
    pub export_format: Option<ExportFormat>,

    /// Index of the tree to export.
    #[arg(long, default_value_t = 0)]
    pub tree_index: usize,

    /// Which branch segments take a clade's own colour.
    #[arg(long, value_enum, default_value_t = BranchColouring::Both)]
    pub branch_colouring: BranchColouring,

    /// Pixels per unit of branch length.
    #[arg(long)]
    pub x_scale: Option<f32>,

    /// Pixels between neighbouring leaves.
    #[arg(long)]
    pub y_scale: Option<f32>,

    /// Pixel density multiplier for PNG output.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Show a scale bar below the tree.
    #[arg(long)]
    pub scale_bar: bool,

    /// Order every clade's children by increasing leaf count.
    #[arg(long)]
    pub ladderize: bool,

    /// TrueType/OpenType font used for PNG labels.
    #[arg(long, value_name = "FONT_FILE")]
    pub font: Option<PathBuf>,

    /// Save all trees, with their styles, as a project file.
    #[arg(long, value_name = "PROJECT_FILE")]
    pub save_project: Option<PathBuf>,

    /// Write all trees back out as Newick text.
    #[arg(long, value_name = "NEWICK_FILE")]
    pub write_newick: Option<PathBuf>,
}

pub struct TreeStyleApp;

impl TreeStyleApp {
    pub fn run(config: &AppConfig) -> Result<()> {
        let mut bundle = io::load_trees(&config.tree_path)?;
        print_summary(&bundle);

        if config.ladderize {
            for tree in &mut bundle.trees {
                tree.ladderize(true);
            }
            info!("ladderized {} tree(s)", bundle.trees.len());
        }

        if let Some(dest) = &config.output {
            let count = bundle.trees.len();
            let tree = bundle.trees.get_mut(config.tree_index).ok_or_else(|| {
                anyhow!(
                    "tree index {} out of range (file has {count} tree(s))",
                    config.tree_index
                )
            })?;
            apply_style_overrides(tree, config);
            Self::export(tree, config, dest)?;
        }

        if let Some(path) = &config.save_project {
            project::save_file(path, &bundle.trees)
                .with_context(|| format!("failed to save project {}", path.display()))?;
        }

        if let Some(path) = &config.write_newick {
            io::write_newick_file(path, &bundle.trees)?;
        }

        Ok(())
    }

    fn export(tree: &Tree, config: &AppConfig, dest: &Path) -> Result<()> {
        let format = match config.export_format {
            Some(format) => format,
            None => format_from_extension(dest)?,
        };
        let options = export_options(config)?;

        let file =
            File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        export::export(
            format,
            Some(tree),
            Some(&mut writer as &mut dyn Write),
            Some(&options),
        )
        .with_context(|| format!("failed to export {format} to {}", dest.display()))?;
        info!("wrote {format} figure to {}", dest.display());
        Ok(())
    }
}

fn print_summary(bundle: &TreeBundle) {
    println!(
        "{} tree(s) loaded from {} input",
        bundle.trees.len(),
        bundle.format
    );
    for (index, tree) in bundle.trees.iter().enumerate() {
        println!(
            "  [{index}] {}: {} leaves, {} clades",
            tree.label.as_deref().unwrap_or("(unnamed)"),
            tree.leaves().count(),
            tree.clade_count()
        );
    }
}

fn apply_style_overrides(tree: &mut Tree, config: &AppConfig) {
    if let Some(x_scale) = config.x_scale {
        tree.style.x_scale = x_scale;
    }
    if let Some(y_scale) = config.y_scale {
        tree.style.y_scale = y_scale;
    }
    if config.scale_bar {
        tree.style.scale_bar.visible = true;
    }
}

fn export_options(config: &AppConfig) -> Result<ExportOptions> {
    let font_data = match &config.font {
        Some(path) => Some(
            fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?,
        ),
        None => None,
    };

    let title = config
        .tree_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Tree".to_owned());

    Ok(ExportOptions {
        draw: DrawOptions {
            branch_colouring: config.branch_colouring,
            ..DrawOptions::default()
        },
        raster: RasterOptions {
            scale: config.scale,
            font_data,
        },
        title,
        ..ExportOptions::default()
    })
}

fn format_from_extension(path: &Path) -> Result<ExportFormat> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("svg") => Ok(ExportFormat::Svg),
        Some("png") => Ok(ExportFormat::Png),
        Some("pdf") => Ok(ExportFormat::Pdf),
        Some(other) => {
            bail!("cannot infer export format from extension `.{other}`; use --export-format")
        }
        None => {
            warn!("output has no extension; exporting SVG");
            Ok(ExportFormat::Svg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> AppConfig {
        AppConfig::parse_from(std::iter::once("treestyle").chain(args.iter().copied()))
    }

    #[test]
    fn parses_cli_flags() {
        let config = config(&[
            "in.nwk",
            "-o",
            "out.png",
            "--branch-colouring",
            "vertical-only",
            "--ladderize",
            "--tree-index",
            "2",
        ]);
        assert_eq!(config.tree_path, PathBuf::from("in.nwk"));
        assert_eq!(config.branch_colouring, BranchColouring::VerticalOnly);
        assert!(config.ladderize);
        assert_eq!(config.tree_index, 2);
        assert_eq!(config.export_format, None);
    }

    #[test]
    fn infers_format_from_extension() {
        let format = |name: &str| format_from_extension(Path::new(name)).unwrap();
        assert_eq!(format("a.SVG"), ExportFormat::Svg);
        assert_eq!(format("a.pdf"), ExportFormat::Pdf);
        assert_eq!(format("a"), ExportFormat::Svg);
        assert!(format_from_extension(Path::new("a.jpeg")).is_err());
    }

    #[test]
    fn run_exports_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.nwk");
        fs::write(&input, "((A:1,B:2):1,C:3);\n(D,E);\n").unwrap();
        let figure = dir.path().join("tree.svg");
        let project_path = dir.path().join("trees.tsp");
        let newick_path = dir.path().join("out.nwk");

        let config = config(&[
            input.to_str().unwrap(),
            "-o",
            figure.to_str().unwrap(),
            "--scale-bar",
            "--save-project",
            project_path.to_str().unwrap(),
            "--write-newick",
            newick_path.to_str().unwrap(),
        ]);
        TreeStyleApp::run(&config).unwrap();

        assert!(fs::read_to_string(&figure).unwrap().contains("scale-bar-line"));
        let reloaded = project::load_file(&project_path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded[0].style.scale_bar.visible);
        assert_eq!(
            fs::read_to_string(&newick_path).unwrap(),
            "((A:1,B:2):1,C:3);\n(D,E);\n"
        );
    }

    #[test]
    fn tree_index_out_of_range_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.nwk");
        fs::write(&input, "(A,B);").unwrap();
        let figure = dir.path().join("tree.svg");
        let config = config(&[
            input.to_str().unwrap(),
            "-o",
            figure.to_str().unwrap(),
            "--tree-index",
            "3",
        ]);
        let err = TreeStyleApp::run(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tree index 3 out of range (file has 1 tree(s))"
        );
        assert!(!figure.exists());
    }
}
