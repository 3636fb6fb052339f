use std::fs;
use std::path::Path;

use anyhow::Result;
use basic_cleaning::artifact::{
    ArtifactRef, ArtifactStore, FsArtifactStore, LineageEvent, PendingArtifact, RAW_DATA_TYPE,
};
use basic_cleaning::cleaning::{CleaningParams, CleaningStep};
use basic_cleaning::error::CleaningError;
use basic_cleaning::filter::{PriceRange, NYC_BOUNDING_BOX};
use basic_cleaning::mirror::ExperimentMirror;
use basic_cleaning::run_context::RunContext;
use basic_cleaning::table::Table;
use tempfile::tempdir;

const RAW_LISTINGS: &str = "\
id,name,neighbourhood_group,latitude,longitude,price,minimum_nights
1,Cozy loft,Brooklyn,40.6780,-73.9442,150,2
2,\"Penthouse, river view\",Manhattan,40.7580,-73.9855,1200,3
3,Budget room,Queens,40.7282,-73.7949,9,1
4,Lake house,Upstate,42.6526,-73.7562,200,2
5,Shore cottage,Jersey,40.7357,-70.0001,80,5
6,Studio,Bronx,40.8448,-73.8648,,1
7,Garden apt,Staten Island,40.5795,-74.1502,95,2
";

fn publish_raw(store: &FsArtifactStore, scratch: &Path, files: &[(&str, &str)]) -> Result<()> {
    let mut pending = PendingArtifact::new("sample.csv", RAW_DATA_TYPE, "Raw NYC listings")?;
    for (name, body) in files {
        let path = scratch.join(name);
        fs::write(&path, body)?;
        pending.add_file(&path)?;
    }
    store.log_artifact(pending)?;
    Ok(())
}

fn params(sample: Option<&str>) -> Result<CleaningParams> {
    Ok(CleaningParams {
        input_artifact: "sample.csv:latest".parse()?,
        output_artifact: "clean_sample.csv".to_string(),
        output_type: "clean_sample".to_string(),
        output_description: "Data with outliers and null values removed".to_string(),
        price_range: PriceRange::new(10.0, 350.0)?,
        sample: sample.map(str::to_string),
    })
}

fn ids(table: &Table) -> Vec<String> {
    table.rows().iter().map(|r| r[0].to_string()).collect()
}

#[test]
fn cleans_and_publishes_new_artifact() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let work = tempdir()?;

    let seeder = FsArtifactStore::new(store_root.path(), RunContext::default());
    publish_raw(&seeder, scratch.path(), &[("sample.csv", RAW_LISTINGS)])?;

    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());
    let report = CleaningStep::new(&store, &ctx, work.path()).run(&params(None)?)?;

    assert_eq!(report.rows_loaded, 7);
    assert_eq!(report.rows_after_price, 4);
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.output_path, work.path().join("clean_sample.csv"));
    assert_eq!(report.output.name, "clean_sample.csv");
    assert_eq!(report.output.kind, "clean_sample");
    assert_eq!(report.output.version, 0);
    assert_eq!(report.output.created_by_run, Some(ctx.run_id));

    // Output keeps the schema, drops no columns and adds no index
    let cleaned = Table::load_csv(&report.output_path)?;
    let raw = Table::load_csv(&report.input_file)?;
    assert_eq!(cleaned.headers(), raw.headers());
    assert_eq!(ids(&cleaned), vec!["1", "7"]);
    assert!(cleaned.rows().iter().all(|row| raw.rows().contains(row)));

    let range = PriceRange::new(10.0, 350.0)?;
    for ((price, lon), lat) in cleaned
        .numeric_column("price")?
        .into_iter()
        .zip(cleaned.numeric_column("longitude")?)
        .zip(cleaned.numeric_column("latitude")?)
    {
        assert!(range.contains(price));
        assert!(NYC_BOUNDING_BOX.contains(lon, lat));
    }

    // The published artifact resolves and carries the same bytes
    let published = store.use_artifact(&"clean_sample.csv:latest".parse::<ArtifactRef>()?, "clean_sample")?;
    let dir = store.download(&published, &work.path().join("check"))?;
    assert_eq!(
        fs::read(dir.join("clean_sample.csv"))?,
        fs::read(&report.output_path)?
    );

    let events: Vec<(LineageEvent, String)> = store
        .lineage()?
        .into_iter()
        .map(|r| (r.event, r.artifact))
        .collect();
    assert_eq!(events[0], (LineageEvent::Used, "sample.csv".to_string()));
    assert_eq!(events[1], (LineageEvent::Logged, "clean_sample.csv".to_string()));
    Ok(())
}

#[test]
fn cleaning_its_own_output_is_a_noop() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let work = tempdir()?;

    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());
    publish_raw(&store, scratch.path(), &[("sample.csv", RAW_LISTINGS)])?;
    let first = CleaningStep::new(&store, &ctx, work.path()).run(&params(None)?)?;

    // Republish the cleaned file as raw data and clean it again
    let cleaned = fs::read_to_string(&first.output_path)?;
    publish_raw(&store, scratch.path(), &[("sample.csv", cleaned.as_str())])?;
    let second_work = tempdir()?;
    let second = CleaningStep::new(&store, &ctx, second_work.path()).run(&params(None)?)?;

    assert_eq!(second.rows_loaded, second.rows_written);
    assert_eq!(fs::read_to_string(&second.output_path)?, cleaned);
    // Identical content does not create a new output version
    assert_eq!(second.output.version, first.output.version);
    Ok(())
}

#[test]
fn sample_selects_file_and_default_is_lexical() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());

    let only_cheap = "id,latitude,longitude,price\n1,40.7,-73.9,20\n";
    let only_pricey = "id,latitude,longitude,price\n2,40.7,-73.9,300\n";
    publish_raw(
        &store,
        scratch.path(),
        &[("b.csv", only_pricey), ("a.csv", only_cheap)],
    )?;

    let work = tempdir()?;
    let default = CleaningStep::new(&store, &ctx, work.path()).run(&params(None)?)?;
    assert!(default.input_file.ends_with("a.csv"));

    let work = tempdir()?;
    let chosen = CleaningStep::new(&store, &ctx, work.path()).run(&params(Some("b.csv"))?)?;
    assert!(chosen.input_file.ends_with("b.csv"));
    assert_eq!(ids(&Table::load_csv(&chosen.output_path)?), vec!["2"]);
    Ok(())
}

#[test]
fn missing_required_column_aborts_before_publishing() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let work = tempdir()?;
    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());
    publish_raw(&store, scratch.path(), &[("sample.csv", "id,price\n1,50\n")])?;

    let err = CleaningStep::new(&store, &ctx, work.path())
        .run(&params(None)?)
        .unwrap_err();
    assert!(matches!(err, CleaningError::MissingColumn(ref c) if c == "longitude"));
    assert!(store.versions("clean_sample.csv")?.is_empty());
    Ok(())
}

#[test]
fn mirror_receives_a_copy_of_the_output() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let work = tempdir()?;
    let mirror_root = tempdir()?;
    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());
    publish_raw(&store, scratch.path(), &[("sample.csv", RAW_LISTINGS)])?;

    let mirror = ExperimentMirror::new(mirror_root.path());
    let report = CleaningStep::new(&store, &ctx, work.path())
        .with_mirror(&mirror)
        .run(&params(None)?)?;

    let mirrored = report.mirrored_to.expect("mirror copy");
    assert!(mirrored.starts_with(mirror_root.path()));
    assert_eq!(fs::read(mirrored)?, fs::read(&report.output_path)?);
    Ok(())
}

#[test]
fn filtering_out_every_row_still_publishes_the_header() -> Result<()> {
    let store_root = tempdir()?;
    let scratch = tempdir()?;
    let work = tempdir()?;
    let ctx = RunContext::default();
    let store = FsArtifactStore::new(store_root.path(), ctx.clone());
    let far_away = "id,latitude,longitude,price\n1,51.5,-0.12,100\n2,40.7,-73.9,NA\n";
    publish_raw(&store, scratch.path(), &[("sample.csv", far_away)])?;

    let report = CleaningStep::new(&store, &ctx, work.path()).run(&params(None)?)?;

    assert_eq!(report.rows_loaded, 2);
    assert_eq!(report.rows_after_price, 1);
    assert_eq!(report.rows_written, 0);
    let cleaned = Table::load_csv(&report.output_path)?;
    assert!(cleaned.is_empty());
    assert_eq!(cleaned.headers(), ["id", "latitude", "longitude", "price"]);
    assert_eq!(report.output.version, 0);
    Ok(())
}
