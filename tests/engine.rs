//! End-to-end scenario: registry classes driving components populated from
//! markup packets with templates, expressions and teardown.

use std::cell::RefCell;
use std::rc::Rc;

use trellis::{
    define, reset_registry, Context, CreateArgs, MapSource, PacketOptions, Stage, TraitSpec,
    Value,
};

#[test]
fn test_full_widget_lifecycle() {
    reset_registry();
    let torn_down: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    define("UI", TraitSpec::new()).unwrap();
    let log = torn_down.clone();
    define(
        "UI.Card",
        TraitSpec::new()
            .ctor(|instance, _cx, args| {
                let props = match args.first() {
                    Some(Value::Map(map)) => map.clone(),
                    _ => CreateArgs::new(),
                };
                instance
                    .record_mut("UI.Card")
                    .expect("record")
                    .insert("title".into(), props.get("title").cloned().unwrap_or(Value::Unit));
                Ok(())
            })
            .dtor(move |instance, _cx, _args| {
                log.borrow_mut().push(instance.type_name().to_string());
                Ok(())
            }),
    )
    .unwrap();

    let mut stage = Stage::new();
    let root = stage.root_component();

    let mut source = MapSource::new();
    source.insert(
        "card",
        "<div id=\"frame\"><div id=\"$childrenTarget\"></div></div>",
    );
    let context = Context::new();
    context.set("who", Value::Str("world".into()));

    let mut opts = PacketOptions::new();
    opts.context = Some(context);
    opts.source = Some(&mut source);

    let result = stage
        .element_push_packet(
            root,
            "<span id=\"title\">{'Hello ' + who}</span>\
             <Component class=\"UI.Card\" bind=\"card\" src=\"card\" title=\"greeting\">\
             <span id=\"content\">{1+1}</span>\
             </Component>",
            opts,
        )
        .unwrap();

    // Expression splicing reached both text segments.
    let title = result.elements["title"];
    let content = result.elements["content"];
    assert_eq!(stage.document().text_content(title), "Hello world");
    assert_eq!(stage.document().text_content(content), "2");

    // The card's class saw its props.
    let card = result.components["card"];
    let instance = stage.instance(card).unwrap();
    assert!(instance.instance_of("UI.Card"));
    assert_eq!(
        instance.record("UI.Card").unwrap().get("title"),
        Some(&Value::Str("greeting".into()))
    );

    // Flattening: the title node and the template's frame are document
    // siblings, and the slotted content sits inside the frame's target.
    let frame = stage.element_node(card, "frame").unwrap();
    let doc_root = stage.document().root();
    assert_eq!(stage.document().child_nodes(doc_root), &[title, frame]);
    let slot = stage.document().parent(content).unwrap();
    assert_eq!(stage.document().parent(slot), Some(frame));

    // Removing the card finishes its instance and detaches its subtree.
    assert!(stage.element_remove(root, "card").unwrap());
    assert_eq!(*torn_down.borrow(), vec!["UI.Card".to_string()]);
    assert_eq!(stage.document().child_nodes(doc_root), &[title]);
    assert!(stage.is_disposed(card));
}

#[test]
fn test_composed_behaviors_through_packets() {
    reset_registry();
    let built: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let log = built.clone();
    define(
        "Draggable",
        TraitSpec::new().ctor(move |_, _, _| {
            log.borrow_mut().push("draggable");
            Ok(())
        }),
    )
    .unwrap();
    let log = built.clone();
    define(
        "Panel",
        TraitSpec::new()
            .composes_with(["Draggable"])
            .ctor(move |_, _, _| {
                log.borrow_mut().push("panel");
                Ok(())
            }),
    )
    .unwrap();

    let mut stage = Stage::new();
    let root = stage.root_component();
    let result = stage
        .element_push_packet(root, "<Panel bind=\"p\"></Panel>", PacketOptions::new())
        .unwrap();

    // Behavior constructors ran dependency-first.
    assert_eq!(*built.borrow(), vec!["draggable", "panel"]);
    let panel = result.components["p"];
    assert!(stage.instance(panel).unwrap().instance_of("Draggable"));
}
