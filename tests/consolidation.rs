mod common;

use assert2::check;
use common::{all_kinds, lifecycle_lock};
use optrace::profiler::{
    disable, enable, region_enter, region_exit, Activity, CorrelationId, DeviceType,
    InProcessCollector, ProfilerError, RecordScope, Region, SessionConfig,
};
use optrace::profiler::collector::{TAG_KERNEL, TAG_MEMORY_COPY};
use std::sync::Arc;

fn kernel(name: &str, linked: CorrelationId, start_us: u64, duration_us: u64) -> Activity {
    Activity {
        name: name.into(),
        device_index: 0,
        resource_id: 7,
        start_us,
        duration_us,
        type_tag: TAG_KERNEL,
        correlation_id: CorrelationId::UNSET,
        linked_correlation_id: linked,
        metadata: Vec::new(),
    }
}

/// Full session: instrumented regions with shapes and stacks, backend
/// kernels linked back by correlation id, one consolidated view out.
#[test]
fn test_end_to_end_consolidation() {
    let _guard = lifecycle_lock();
    let collector = Arc::new(InProcessCollector::new());
    let config = SessionConfig {
        report_input_shapes: true,
        record_call_stack: true,
        compute_flops_estimate: true,
        ..Default::default()
    };
    enable(config, &all_kinds(), collector.clone()).unwrap();
    check!(collector.is_recording());

    let mm = Region::new("aten::mm")
        .with_input_shapes(vec![vec![2, 3], vec![3, 4]])
        .with_input_dtypes(vec!["float".into(), "float".into()])
        .with_stack(vec!["model.forward".into(), "layer.mm".into()])
        .with_sequence(11, 42);
    let call = region_enter(&mm);
    // The runtime call fired inside this region self-attributes through the
    // thread-local correlation stack.
    collector.inject_runtime_call("launchKernel", 150, 3);
    region_exit(&mm, call);

    let relu = Region::new("aten::relu").with_scope(RecordScope::Function);
    let call = region_enter(&relu);
    region_exit(&relu, call);

    let mut result = disable().unwrap();

    let mm_event = result.events().iter().find(|e| e.name == "aten::mm").unwrap();
    check!(mm_event.device_type == DeviceType::Host);
    check!(mm_event.correlation_id.is_set());
    let mm_record = mm_event.record.as_ref().unwrap();
    check!(mm_record.shapes.as_deref() == Some(&[vec![2, 3], vec![3, 4]][..]));
    check!(mm_record.flops == Some(48));
    check!(mm_record.sequence_number == 11);

    let relu_event = result.events().iter().find(|e| e.name == "aten::relu").unwrap();
    check!(relu_event.correlation_id.as_u64() > mm_event.correlation_id.as_u64());

    // The runtime call surfaces as a host event attributed to aten::mm.
    let launch = result
        .events()
        .iter()
        .find(|e| e.name == "launchKernel")
        .unwrap();
    check!(launch.device_type == DeviceType::Host);
    check!(!launch.correlation_id.is_set());
    check!(launch.linked_correlation_id == mm_event.correlation_id);
    check!(launch.record.is_none());

    // Save consumes the raw trace exactly once.
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("trace.json");
    result.save(&path).unwrap();
    check!(matches!(
        result.save(&path),
        Err(ProfilerError::AlreadySaved)
    ));

    // The merged views survive the save.
    check!(result.events().len() == 3);
}

/// Injected accelerator activities pair with their originating CPU region
/// through the linked correlation id, and the CPU-tagged copies the backend
/// echoes back are not duplicated.
#[test]
fn test_accelerator_activities_join_cpu_regions() {
    let _guard = lifecycle_lock();
    let collector = Arc::new(InProcessCollector::new());
    enable(SessionConfig::default(), &all_kinds(), collector.clone()).unwrap();

    let region = Region::new("aten::conv2d");
    let call = region_enter(&region);
    region_exit(&region, call);

    collector.inject(kernel("implicit_gemm", CorrelationId::UNSET, 200, 40));
    let mut memcpy = kernel("memcpy_htod", CorrelationId::UNSET, 180, 10);
    memcpy.type_tag = TAG_MEMORY_COPY;
    collector.inject(memcpy);

    let result_events = disable().unwrap();

    let conv = result_events
        .events()
        .iter()
        .find(|e| e.name == "aten::conv2d")
        .unwrap();
    check!(conv.device_type == DeviceType::Host);

    let gemm = result_events
        .events()
        .iter()
        .find(|e| e.name == "implicit_gemm")
        .unwrap();
    check!(gemm.device_type == DeviceType::Accelerator);
    check!(gemm.record.is_none());

    let memcpy = result_events
        .events()
        .iter()
        .find(|e| e.name == "memcpy_htod")
        .unwrap();
    check!(memcpy.device_type == DeviceType::Accelerator);

    // One host entry per region, not two.
    let conv_entries = result_events
        .events()
        .iter()
        .filter(|e| e.name == "aten::conv2d")
        .count();
    check!(conv_entries == 1);
}

/// Deferred metadata lands on the raw trace's CPU activities at disable
/// time, rendered in the canonical bracketed formats.
#[test]
fn test_rendered_metadata_reaches_raw_trace() {
    let _guard = lifecycle_lock();
    let collector = Arc::new(InProcessCollector::new());
    let config = SessionConfig {
        report_input_shapes: true,
        record_call_stack: true,
        ..Default::default()
    };
    enable(config, &all_kinds(), collector).unwrap();

    let region = Region::new("aten::addmm")
        .with_input_shapes(vec![vec![4], vec![2, 3], vec![3, 4]])
        .with_input_dtypes(vec!["float".into(), "float".into(), "float".into()])
        .with_stack(vec!["main".into(), "model.forward".into()]);
    let call = region_enter(&region);
    region_exit(&region, call);

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("trace.json");
    let mut result = disable().unwrap();
    result.save(&path).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
    let activities = parsed["activities"].as_array().unwrap();
    let addmm = activities
        .iter()
        .find(|a| a["name"] == "aten::addmm")
        .unwrap();
    let metadata = addmm["metadata"].as_array().unwrap();

    let value_of = |key: &str| -> Option<String> {
        metadata
            .iter()
            .find(|pair| pair[0] == key)
            .map(|pair| pair[1].as_str().unwrap().to_string())
    };

    check!(value_of("Input Dims").as_deref() == Some("[[4], [2, 3], [3, 4]]"));
    check!(
        value_of("Input type").as_deref()
            == Some("[\"float\", \"float\", \"float\"]")
    );
    check!(value_of("Call stack").as_deref() == Some("main;model.forward"));
    check!(value_of("Sequence number").is_none());
}

/// Session-wide metadata and the synthetic start/stop markers.
#[test]
fn test_markers_and_trace_metadata() {
    let _guard = lifecycle_lock();
    let collector = Arc::new(InProcessCollector::new());
    enable(SessionConfig::default(), &all_kinds(), collector).unwrap();
    optrace::profiler::add_metadata("run_id", "42").unwrap();

    let mut result = disable().unwrap();

    let legacy = result.legacy_events();
    check!(legacy.len() == 1, "markers land on one thread's list");
    let names: Vec<&str> = legacy[0].iter().map(|e| e.name.as_str()).collect();
    check!(names == vec!["__start_profile", "__stop_profile"]);

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("trace.json");
    result.save(&path).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
    check!(parsed["trace_metadata"][0][0] == "run_id");
    check!(parsed["trace_metadata"][0][1] == "42");
}
