use std::sync::Arc;
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::theme::{self, Theme};
use iced::widget::{Column, button, column, container, horizontal_rule, row, scrollable, text, text_input};
use log::{error, info};
use tokio_util::sync::{CancellationToken};

use crate::config::io::{ConfigIO};
use crate::config::types::Config;
use crate::device::events::transport_event_subscription;
use crate::device::transport::{open_transport, Transport};
use crate::device::types::TransportKind;
use crate::error::AppRunError;
use crate::gui::executor::MyExecutor;
use crate::gui::types::Message;
use crate::remote::{Remote, run_connect, run_disconnect, run_enable, run_release, run_scan, run_send};
use crate::remote::connection::ConnectionState;

pub struct ApplicationFlags {
    config_io: ConfigIO,
    transport_override: Option<TransportKind>,
}

pub struct MyApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // messages about the application itself that the user must click away; shown before the
    // alerts of the remote
    notices: Vec<String>,

    config_io: ConfigIO,
    transport_override: Option<TransportKind>,

    // None until the config has been loaded
    transport: Option<Arc<dyn Transport>>,
    remote: Remote,

    // contents of the message composer
    device_message: String,
}

impl MyApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    error!("Failed to load config: {:?}", &err);
                    (Config::default(), Some(format!("Failed to load config: {}", &err)))
                }
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn start_transport(&mut self, config: &Config) -> Command<Message> {
        let kind = self.transport_override.unwrap_or(config.transport);

        let transport = match open_transport(kind, config) {
            Ok(transport) => transport,
            Err(err) => {
                error!("Invalid transport config: {:?}", &err);
                self.notices.push(format!("Invalid transport config, using defaults: {}", &err));
                match open_transport(kind, &Config::default()) {
                    Ok(transport) => transport,
                    Err(err) => {
                        self.notices.push(format!("Failed to start transport: {}", &err));
                        return Command::none();
                    },
                }
            },
        };

        info!("Using transport {}", kind);
        self.transport = Some(transport.clone());

        Command::perform(async move { run_enable(transport.as_ref()).await }, Message::EnableComplete)
    }

    fn release(&self, transport: Arc<dyn Transport>, on_complete: Message) -> Option<Command<Message>> {
        let device = self.remote.connected_device()?.clone();

        Some(Command::perform(
            async move { run_release(transport.as_ref(), &device).await },
            move |()| on_complete,
        ))
    }

    fn current_notice(&self) -> Option<(&str, &str)> {
        if let Some(notice) = self.notices.first() {
            return Some(("Robot Remote", notice.as_str()));
        }

        self.remote.current_alert().map(|alert| (alert.title(), alert.message.as_str()))
    }

    fn connection_view(&self) -> Element<Message> {
        let can_press = self.remote.can_press_buttons();

        match self.remote.connection() {
            ConnectionState::Disconnected => column![].into(),
            ConnectionState::Connecting(device) => text(format!("Connecting to {}…", device.name)).into(),
            ConnectionState::Disconnecting(device) => text(format!("Disconnecting from {}…", device.name)).into(),
            ConnectionState::Connected(device) => {
                let mut disconnect_button = button(text("Disconnect"))
                    .style(theme::Button::Destructive);

                if can_press {
                    disconnect_button = disconnect_button.on_press(Message::DisconnectPress);
                }

                column![
                    text(format!("Connection to {} successful!", device.name)).size(20),
                    disconnect_button,
                ].spacing(10).into()
            },
        }
    }

    fn composer_view(&self) -> Element<Message> {
        if self.remote.connected_device().is_none() {
            return column![].into();
        }

        let mut send_button = button(text("Send message"))
            .style(theme::Button::Positive);

        let mut input = text_input("Type here the message to the connected device.", &self.device_message)
            .on_input(Message::DeviceMessageChange);

        if self.remote.can_press_buttons() {
            send_button = send_button.on_press(Message::SendPress);
            input = input.on_submit(Message::SendPress);
        }

        row![input, send_button]
            .align_items(Alignment::Center)
            .spacing(10)
            .into()
    }

    fn devices_view(&self) -> Element<Message> {
        let can_connect = self.remote.can_connect();

        let buttons = self.remote.devices().iter().map(|device| {
            let mut device_button = button(text(&device.name))
                .width(Length::Fill)
                .style(theme::Button::Secondary);

            if can_connect {
                device_button = device_button.on_press(Message::ConnectPress(device.clone()));
            }

            Element::from(device_button)
        });

        scrollable(Column::with_children(buttons).spacing(10))
            .height(Length::Fill)
            .into()
    }
}

impl Application for MyApplication {
    type Executor = MyExecutor;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MyApplication, Command<Self::Message>) {
        let app = MyApplication {
            app_cancel: CancellationToken::new(),
            notices: Vec::new(),
            config_io: flags.config_io,
            transport_override: flags.transport_override,
            transport: None,
            remote: Remote::new(),
            device_message: String::new(),
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        match &self.transport {
            None => String::from(concat!("Robot Remote ", env!("CARGO_PKG_VERSION"))),
            Some(transport) => format!(concat!("Robot Remote ", env!("CARGO_PKG_VERSION"), " ({})"), transport.kind()),
        }
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
                return self.start_transport(&config);
            },
            Message::EnableComplete(result) => {
                self.remote.enable_complete(result);
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                } else {
                    self.remote.dismiss_alert();
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();

                if let Some(transport) = self.transport.clone() {
                    if let Some(command) = self.release(transport, Message::CloseReady(id)) {
                        return command;
                    }
                }
                return window::close(id);
            },
            Message::CloseReady(id) => {
                return window::close(id);
            },

            Message::ScanPress => {
                if let Some(transport) = self.transport.clone() {
                    if let Some(plan) = self.remote.begin_scan() {
                        return Command::perform(
                            async move { run_scan(transport.as_ref(), plan).await },
                            Message::ScanComplete,
                        );
                    }
                }
            },
            Message::ScanComplete(outcome) => {
                self.remote.finish_scan(outcome);
            },
            Message::ConnectPress(device) => {
                if let Some(transport) = self.transport.clone() {
                    if let Some(plan) = self.remote.begin_connect(device) {
                        return Command::perform(
                            async move { run_connect(transport.as_ref(), plan).await },
                            Message::ConnectComplete,
                        );
                    }
                }
            },
            Message::ConnectComplete(outcome) => {
                self.remote.finish_connect(outcome);
            },
            Message::DisconnectPress => {
                if let Some(transport) = self.transport.clone() {
                    if let Some(device) = self.remote.begin_disconnect() {
                        return Command::perform(
                            async move { run_disconnect(transport.as_ref(), &device).await },
                            Message::DisconnectComplete,
                        );
                    }
                }
            },
            Message::DisconnectComplete(result) => {
                self.remote.finish_disconnect(result);
            },
            Message::DeviceMessageChange(device_message) => {
                self.device_message = device_message;
            },
            Message::SendPress => {
                if let Some(transport) = self.transport.clone() {
                    if let Some(frame) = self.remote.begin_send(&self.device_message) {
                        return Command::perform(
                            async move { run_send(transport.as_ref(), frame).await },
                            Message::SendComplete,
                        );
                    }
                }
            },
            Message::SendComplete(result) => {
                self.remote.finish_send(result);
            },
            Message::TransportEvent(event) => {
                if let Some(device) = self.remote.handle_event(event) {
                    if let Some(transport) = self.transport.clone() {
                        return Command::perform(
                            async move { run_release(transport.as_ref(), &device).await },
                            Message::ReleaseComplete,
                        );
                    }
                }
            },

            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![event::listen().map(Message::EventOccurred)];

        if let Some(transport) = &self.transport {
            subscriptions.push(
                transport_event_subscription(self.app_cancel.clone(), transport.clone())
                    .map(Message::TransportEvent)
            );
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        if let Some((title, notice)) = self.current_notice() {
            return container(
                column![
                    text(title).size(24),

                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        if !self.remote.can_operate() {
            return container(
                text("Please turn on bluetooth and allow this application to use it.").size(24),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let scan_label = if self.remote.busy().scanning { "Scanning…" } else { "Scan for devices" };
        let mut scan_button = button(text(scan_label))
            .style(theme::Button::Primary);

        if self.remote.can_scan() {
            scan_button = scan_button.on_press(Message::ScanPress);
        }

        container(
            column![
                text("Bluetooth is turned on.").size(24),

                scan_button,

                self.connection_view(),

                horizontal_rule(10),

                self.devices_view(),

                self.composer_view(),
            ]
                .spacing(20)
                .width(Length::Fill)
                .height(Length::Fill),
        )
        .width(Length::Fill)
        .padding(20)
        .into()
    }
}

pub fn run_application(transport_override: Option<TransportKind>) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io, transport_override };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested) so that the robot is disconnected first
    settings.id = Some("robot-remote".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(480.0, 640.0);

    // this function will call process::exit() unless there was a startup error
    MyApplication::run(settings)?;
    Ok(())
}
