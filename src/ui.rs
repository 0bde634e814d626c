use iocraft::prelude::*;
use tokio::sync::watch;

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    /// Percentage in `[0, 100]`.
    pub progress: Option<watch::Receiver<f32>>,
}

#[component]
pub fn ProgressBar(props: &mut ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut percent = hooks.use_state(|| 0.0f32);
    let receiver = props.progress.take();

    hooks.use_future(async move {
        let Some(mut receiver) = receiver else {
            return;
        };
        while receiver.changed().await.is_ok() {
            let value = *receiver.borrow_and_update();
            percent.set(value.clamp(0.0, 100.0));
        }
    });

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: props.title.clone())
            View(flex_direction: FlexDirection::Row) {
                View(border_style: BorderStyle::Round, border_color: Color::Blue, width: 60) {
                    View(width: Percent(percent.get()), height: 1, background_color: Color::Green)
                }
                View(padding: 1) {
                    Text(content: format!("{:.0}%", percent.get()))
                }
            }
        }
    }
}

#[derive(Default, Props)]
pub struct MessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Green, content: "✔ ")
            Text(content: props.message.clone())
        }
    }
}

#[component]
pub fn ErrorMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, content: "✖ ")
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct ResponseBodyProps {
    pub status: Option<String>,
    pub body: String,
}

#[component]
pub fn ResponseBody(props: &ResponseBodyProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.status.as_ref().map(|status| element! {
                Text(weight: Weight::Bold, content: status.clone())
            }))
            View(border_style: BorderStyle::Single, border_color: Color::DarkGrey, padding_left: 1, padding_right: 1) {
                Text(content: props.body.clone())
            }
        }
    }
}
