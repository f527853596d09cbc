use at_core::{EventRecord, KinematicsMode, LorentzVector, VectorSource};
use at_select::prelude::*;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn make_record(njets: usize) -> EventRecord {
    // Deterministic spread of pt/eta so roughly half the jets survive.
    let pt: Vec<f64> = (0..njets).map(|i| 10.0 + 7.0 * (i % 10) as f64).collect();
    let eta: Vec<f64> = (0..njets).map(|i| -3.0 + 0.6 * (i % 11) as f64).collect();
    let mut rec = EventRecord::new();
    rec.set_column("jet_pt", pt)
        .set_column("jet_eta", eta)
        .set_column("jet_phi", vec![0.3; njets])
        .set_column("jet_m", vec![5.0; njets])
        .set_column("jet_btag", (0..njets).map(|i| (i % 3) as f64 / 2.0).collect())
        .set_vectors("muons", vec![LorentzVector::from_pt_eta_phi_m(40.0, 0.1, 1.0, 0.1)])
        .set_scalar("met", 75.0);
    rec
}

fn make_analysis(caching: bool) -> Analysis {
    let input =
        VectorSource::columns(KinematicsMode::PtEtaPhiM, "jet_pt", "jet_eta", "jet_phi", "jet_m");
    let mut jets = ObjectDefinition::new("Jets").with_input(input);
    jets.add_info("btag", "jet_btag").unwrap();
    jets.set_caching(caching);
    jets.add_cut(Cut::from_expr("pT", "pt > 25").unwrap()).unwrap();
    jets.add_cut(Cut::from_expr("Eta", "abs(eta) < 2.5").unwrap()).unwrap();
    jets.add_plot(CutPosition::Pre, PlotRecorder::from_expr("pt", "pt").unwrap()).unwrap();

    let mut es = EventSelection::new("Event");
    es.add_categories(&["SR", "CR"]).unwrap();
    es.set_caching(caching);
    es.add_info("MET", "met").unwrap();
    es.add_nominal_collection("Jets", "Jets").unwrap();
    es.add_input_collection("Muons", VectorSource::Vectors("muons".into())).unwrap();
    es.add_cut(Cut::from_expr("MET", "MET > 50").unwrap()).unwrap();
    es.add_cut_to(Cut::from_expr("Jets", "Jets.n >= 2").unwrap(), "SR").unwrap();
    es.add_cut_to(Cut::from_expr("Muons", "Muons.n == 1").unwrap(), "CR").unwrap();

    let mut a = Analysis::new("Bench");
    a.add_selection(jets).unwrap();
    a.add_selection(es).unwrap();
    a
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_run");

    for njets in [4usize, 16, 64] {
        let rec = make_record(njets);
        for caching in [false, true] {
            let id = BenchmarkId::new(if caching { "cached" } else { "uncached" }, njets);
            let mut analysis = make_analysis(caching);
            group.bench_with_input(id, &rec, |b, rec| {
                b.iter(|| black_box(analysis.run(rec, 1.0, None).unwrap()))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
